// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标系统
///
/// 在 `listen_addr` 上启动 Prometheus 导出器并注册队列指标。
/// 地址无效或端口被占用时只记录警告，服务继续运行。
pub fn init_metrics(listen_addr: &str) {
    let addr: SocketAddr = match listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", listen_addr, e);
            return;
        }
    };

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}", e);
        return;
    }

    describe_queue_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_queue_metrics() {
    describe_counter!(
        "queue_items_enqueued_total",
        "Queue items admitted, labelled by initial status"
    );
    describe_counter!("queue_items_claimed_total", "Queue items claimed by workers");
    describe_counter!(
        "queue_items_completed_total",
        "Queue items reported completed"
    );
    describe_counter!("queue_items_failed_total", "Queue items reported failed");
    describe_counter!(
        "queue_items_recovered_total",
        "Stale queue items put back to new, labelled by sweeper"
    );
    describe_counter!(
        "queue_sequential_promotions_total",
        "Held items released to new within their category"
    );
    describe_counter!(
        "queue_sequential_demotions_total",
        "Items set to hold because their category already had an active item"
    );
}
