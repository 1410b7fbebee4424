// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::queue_item::QueueStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 完成上报响应
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponseDto {
    pub id: Uuid,
    /// 本次调用是否完成了该队列项，重复上报时为 false
    pub completed: bool,
}

/// 队列统计响应
#[derive(Debug, Deserialize, Serialize)]
pub struct QueueStatsDto {
    pub total: u64,
    pub counts: BTreeMap<QueueStatus, u64>,
}

impl From<BTreeMap<QueueStatus, u64>> for QueueStatsDto {
    fn from(counts: BTreeMap<QueueStatus, u64>) -> Self {
        Self {
            total: counts.values().sum(),
            counts,
        }
    }
}
