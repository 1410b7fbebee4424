// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::queue_item::{NewQueueItem, QueueItem, QueueStatus};
use crate::domain::repositories::queue_repository::{QueueRepository, RepositoryError};
use crate::queue::enqueuer::Enqueuer;
use crate::queue::transitioner::StatusTransitioner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 请求校验失败，未写入任何数据
    #[error("Validation error: {0}")]
    Validation(String),

    /// 目标队列项不存在
    #[error("Queue item not found: {0}")]
    NotFound(String),

    /// 目标队列项已进入终态
    #[error("Queue item {0} is already {1}")]
    AlreadyTerminal(Uuid, QueueStatus),

    /// 批量迁移没有修改任何队列项
    #[error("No queue item matched the transition")]
    NoMatch,

    /// 多次比较并更新仍然失败
    #[error("Queue item {0} is being modified concurrently")]
    Contention(Uuid),

    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// 领取请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub destination: Option<String>,
    pub action: Option<String>,
    /// 领取后的状态，只能是 on_flight、sent 或 processing
    #[serde(default = "default_claim_status")]
    pub claim_status: QueueStatus,
}

fn default_claim_status() -> QueueStatus {
    QueueStatus::OnFlight
}

impl ClaimRequest {
    pub fn for_destination(destination: impl Into<String>) -> Self {
        Self {
            destination: Some(destination.into()),
            claim_status: QueueStatus::OnFlight,
            ..Default::default()
        }
    }
}

/// 工作队列特质
///
/// 生产者、工作器与运维人员看到的全部操作。
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// 入队单个队列项
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, QueueError>;
    /// 批量入队，每项独立准入
    async fn enqueue_many(&self, items: Vec<NewQueueItem>) -> Result<Vec<QueueItem>, QueueError>;
    /// 批量入队并保证同分类只有一个活跃项
    async fn enqueue_sequential(
        &self,
        items: Vec<NewQueueItem>,
    ) -> Result<Vec<QueueItem>, QueueError>;
    /// 领取下一个可执行的队列项
    async fn claim(&self, request: ClaimRequest) -> Result<Option<QueueItem>, QueueError>;
    /// 上报开始处理
    async fn mark_processing(&self, id: Uuid) -> Result<QueueItem, QueueError>;
    /// 上报完成，返回本次调用是否完成了该项
    async fn mark_completed(&self, id: Uuid) -> Result<bool, QueueError>;
    /// 上报失败
    async fn mark_failed(
        &self,
        id: Uuid,
        error_details: serde_json::Value,
    ) -> Result<QueueItem, QueueError>;
    /// 查询单个队列项
    async fn get(&self, id: Uuid) -> Result<QueueItem, QueueError>;
    /// 人工重置重试次数
    async fn reset_retries(&self, id: Uuid) -> Result<QueueItem, QueueError>;
    /// 列出重试次数已耗尽、不会再被自动恢复的队列项
    async fn list_retry_exhausted(&self, limit: u64) -> Result<Vec<QueueItem>, QueueError>;
    /// 各状态的队列项数量
    async fn status_counts(&self) -> Result<BTreeMap<QueueStatus, u64>, QueueError>;
}

/// 基于仓库的工作队列实现
pub struct QueueService<R: QueueRepository> {
    enqueuer: Enqueuer<R>,
    transitioner: StatusTransitioner<R>,
    retry_cap: i32,
}

impl<R: QueueRepository> QueueService<R> {
    /// 创建新的队列服务
    ///
    /// # 参数
    ///
    /// * `repository` - 队列仓库
    /// * `retry_cap` - 自动恢复次数上限，用于识别重试耗尽的队列项
    pub fn new(repository: Arc<R>, retry_cap: i32) -> Self {
        Self {
            enqueuer: Enqueuer::new(repository.clone()),
            transitioner: StatusTransitioner::new(repository),
            retry_cap,
        }
    }

    pub fn transitioner(&self) -> &StatusTransitioner<R> {
        &self.transitioner
    }
}

#[async_trait]
impl<R: QueueRepository + 'static> WorkQueue for QueueService<R> {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, QueueError> {
        self.enqueuer.enqueue(item).await
    }

    async fn enqueue_many(&self, items: Vec<NewQueueItem>) -> Result<Vec<QueueItem>, QueueError> {
        self.enqueuer.enqueue_many(items).await
    }

    async fn enqueue_sequential(
        &self,
        items: Vec<NewQueueItem>,
    ) -> Result<Vec<QueueItem>, QueueError> {
        self.enqueuer.enqueue_sequential(items).await
    }

    async fn claim(&self, request: ClaimRequest) -> Result<Option<QueueItem>, QueueError> {
        self.transitioner.claim(&request).await
    }

    async fn mark_processing(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        self.transitioner.mark_processing(id).await
    }

    async fn mark_completed(&self, id: Uuid) -> Result<bool, QueueError> {
        self.transitioner.mark_completed(id).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_details: serde_json::Value,
    ) -> Result<QueueItem, QueueError> {
        self.transitioner.mark_failed(id, error_details).await
    }

    async fn get(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        self.transitioner.get(id).await
    }

    async fn reset_retries(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        self.transitioner.reset_retries(id).await
    }

    async fn list_retry_exhausted(&self, limit: u64) -> Result<Vec<QueueItem>, QueueError> {
        self.transitioner
            .list_retry_exhausted(self.retry_cap, limit)
            .await
    }

    async fn status_counts(&self) -> Result<BTreeMap<QueueStatus, u64>, QueueError> {
        self.transitioner.status_counts().await
    }
}

#[async_trait]
impl<T: WorkQueue + ?Sized> WorkQueue for Arc<T> {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, QueueError> {
        (**self).enqueue(item).await
    }

    async fn enqueue_many(&self, items: Vec<NewQueueItem>) -> Result<Vec<QueueItem>, QueueError> {
        (**self).enqueue_many(items).await
    }

    async fn enqueue_sequential(
        &self,
        items: Vec<NewQueueItem>,
    ) -> Result<Vec<QueueItem>, QueueError> {
        (**self).enqueue_sequential(items).await
    }

    async fn claim(&self, request: ClaimRequest) -> Result<Option<QueueItem>, QueueError> {
        (**self).claim(request).await
    }

    async fn mark_processing(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        (**self).mark_processing(id).await
    }

    async fn mark_completed(&self, id: Uuid) -> Result<bool, QueueError> {
        (**self).mark_completed(id).await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_details: serde_json::Value,
    ) -> Result<QueueItem, QueueError> {
        (**self).mark_failed(id, error_details).await
    }

    async fn get(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        (**self).get(id).await
    }

    async fn reset_retries(&self, id: Uuid) -> Result<QueueItem, QueueError> {
        (**self).reset_retries(id).await
    }

    async fn list_retry_exhausted(&self, limit: u64) -> Result<Vec<QueueItem>, QueueError> {
        (**self).list_retry_exhausted(limit).await
    }

    async fn status_counts(&self) -> Result<BTreeMap<QueueStatus, u64>, QueueError> {
        (**self).status_counts().await
    }
}
