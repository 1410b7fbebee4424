// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::queue::work_queue::QueueError;

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    /// 请求参数错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(QueueError::Validation(message.into()).into())
    }

    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<QueueError>() {
            Some(QueueError::Validation(_)) => StatusCode::BAD_REQUEST,
            Some(QueueError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(QueueError::AlreadyTerminal(..)) | Some(QueueError::NoMatch) => {
                StatusCode::CONFLICT
            }
            Some(QueueError::Contention(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Some(QueueError::Repository(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = self.0.to_string();
        if status.is_server_error() {
            error!("Request failed: {}", error_message);
        }

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
