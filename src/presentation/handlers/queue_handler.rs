// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::application::dto::queue_request::{
    BatchEnqueueRequestDto, ExhaustedQueryDto, FailRequestDto,
};
use crate::application::dto::queue_response::{CompletionResponseDto, QueueStatsDto};
use crate::domain::models::queue_item::{NewQueueItem, QueueItem};
use crate::presentation::errors::AppError;
use crate::queue::work_queue::{ClaimRequest, WorkQueue};
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// 入队单个队列项
pub async fn enqueue<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Json(payload): Json<NewQueueItem>,
) -> Result<(StatusCode, Json<QueueItem>), AppError> {
    let item = queue.enqueue(payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// 批量入队
///
/// `sequential` 为真时同一批次内每个分类只有最早的一项成为活跃项。
pub async fn enqueue_batch<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Json(payload): Json<BatchEnqueueRequestDto>,
) -> Result<(StatusCode, Json<Vec<QueueItem>>), AppError> {
    payload
        .validate()
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    let items = if payload.sequential {
        queue.enqueue_sequential(payload.items).await?
    } else {
        queue.enqueue_many(payload.items).await?
    };
    Ok((StatusCode::CREATED, Json(items)))
}

/// 领取下一个队列项，没有可领取的队列项时返回 204
pub async fn claim<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Response, AppError> {
    match queue.claim(payload).await? {
        Some(item) => Ok(Json(item).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn mark_processing<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    Ok(Json(queue.mark_processing(id).await?))
}

pub async fn mark_completed<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionResponseDto>, AppError> {
    let completed = queue.mark_completed(id).await?;
    Ok(Json(CompletionResponseDto { id, completed }))
}

pub async fn mark_failed<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FailRequestDto>,
) -> Result<Json<QueueItem>, AppError> {
    Ok(Json(queue.mark_failed(id, payload.error_details).await?))
}

pub async fn get_item<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    Ok(Json(queue.get(id).await?))
}

pub async fn reset_retries<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueItem>, AppError> {
    Ok(Json(queue.reset_retries(id).await?))
}

pub async fn stats<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
) -> Result<Json<QueueStatsDto>, AppError> {
    let counts = queue.status_counts().await?;
    Ok(Json(counts.into()))
}

/// 重试次数已耗尽、需要人工处理的队列项
pub async fn list_exhausted<Q: WorkQueue + 'static>(
    Extension(queue): Extension<Arc<Q>>,
    Query(query): Query<ExhaustedQueryDto>,
) -> Result<Json<Vec<QueueItem>>, AppError> {
    query
        .validate()
        .map_err(|e| AppError::bad_request(e.to_string()))?;
    Ok(Json(queue.list_retry_exhausted(query.limit()).await?))
}
