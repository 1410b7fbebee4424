// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::presentation::handlers::queue_handler;
use crate::queue::work_queue::WorkQueue;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 创建应用路由
///
/// # 参数
///
/// * `queue` - 工作队列
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes<Q: WorkQueue + 'static>(queue: Arc<Q>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let queue_routes = Router::new()
        .route("/v1/queue", post(queue_handler::enqueue::<Q>))
        .route("/v1/queue/batch", post(queue_handler::enqueue_batch::<Q>))
        .route("/v1/queue/claim", post(queue_handler::claim::<Q>))
        .route("/v1/queue/stats", get(queue_handler::stats::<Q>))
        .route("/v1/queue/exhausted", get(queue_handler::list_exhausted::<Q>))
        .route("/v1/queue/{id}", get(queue_handler::get_item::<Q>))
        .route(
            "/v1/queue/{id}/processing",
            post(queue_handler::mark_processing::<Q>),
        )
        .route(
            "/v1/queue/{id}/complete",
            post(queue_handler::mark_completed::<Q>),
        )
        .route("/v1/queue/{id}/fail", post(queue_handler::mark_failed::<Q>))
        .route(
            "/v1/queue/{id}/reset-retries",
            post(queue_handler::reset_retries::<Q>),
        )
        .layer(Extension(queue));

    Router::new()
        .merge(public_routes)
        .merge(queue_routes)
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
