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

use crate::domain::models::queue_item::NewQueueItem;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// 批量入队请求数据传输对象
#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnqueueRequestDto {
    /// 待入队的队列项
    #[validate(length(min = 1, message = "items cannot be empty"))]
    pub items: Vec<NewQueueItem>,
    /// 为真时按分类顺序准入
    #[serde(default)]
    pub sequential: bool,
}

/// 失败上报请求数据传输对象
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailRequestDto {
    /// 工作器上报的错误信息，原样保存
    #[serde(default)]
    pub error_details: Value,
}

/// 重试耗尽列表查询参数
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ExhaustedQueryDto {
    /// 返回数量上限
    #[validate(range(min = 1, max = 500, message = "limit must be between 1 and 500"))]
    pub limit: Option<u64>,
}

impl ExhaustedQueryDto {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(50)
    }
}
