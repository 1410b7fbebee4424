// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// 队列项实体
///
/// 队列中唯一的持久化实体。`params` 是业务负载，核心层只负责透传，
/// 从不解析其内容。同一 `sequential_category` 内的队列项按 `created_at`
/// 顺序逐个执行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// 队列项唯一标识符（UUIDv7，按时间有序）
    pub id: Uuid,
    /// 路由标签，由外部工作器消费
    pub action: String,
    /// 路由标签，由外部工作器消费
    pub event: String,
    /// 路由标签，由外部工作器消费
    pub destination: String,
    /// 不透明的业务负载
    pub params: serde_json::Value,
    /// 建议性的优先级
    pub priority: QueuePriority,
    /// 生命周期状态
    pub status: QueueStatus,
    /// 是否参与分类顺序执行
    pub is_sequential: bool,
    /// 顺序分类键
    pub sequential_category: Option<String>,
    /// 强制恢复次数
    pub no_of_retry: i32,
    /// 被工作器领取的时间
    pub flight_at: Option<DateTime<FixedOffset>>,
    /// 成功完成的时间
    pub completed_at: Option<DateTime<FixedOffset>>,
    /// 最近一次上报的失败信息
    pub error_details: Option<serde_json::Value>,
    /// 只追加的状态审计记录
    pub history: Vec<HistoryEntry>,
    /// 乐观并发版本号，每次写入递增
    pub revision: i64,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

/// 历史记录条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub status: QueueStatus,
    pub flight_at: Option<DateTime<FixedOffset>>,
    pub no_of_retry: i32,
    pub error_details: Option<serde_json::Value>,
    pub recorded_at: DateTime<FixedOffset>,
}

/// 队列项优先级
///
/// 仅作为消费者的排序提示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    Immediate,
    #[default]
    Regular,
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueuePriority::Immediate => write!(f, "immediate"),
            QueuePriority::Regular => write!(f, "regular"),
        }
    }
}

impl FromStr for QueuePriority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(QueuePriority::Immediate),
            "regular" => Ok(QueuePriority::Regular),
            other => Err(DomainError::UnknownPriority(other.to_string())),
        }
    }
}

/// 队列项状态枚举
///
/// 状态集合是封闭的：
/// new → on_flight/sent/processing → completed/failed
/// hold → new（同分类的前一项完成后释放）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// 等待工作器领取
    #[default]
    New,
    /// 已准入，但同分类中存在活跃项
    Hold,
    /// 已被工作器领取
    OnFlight,
    /// 已发送给下游
    Sent,
    /// 正在处理
    Processing,
    /// 成功完成（终态）
    Completed,
    /// 失败（终态）
    Failed,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 7] = [
        QueueStatus::New,
        QueueStatus::Hold,
        QueueStatus::OnFlight,
        QueueStatus::Sent,
        QueueStatus::Processing,
        QueueStatus::Completed,
        QueueStatus::Failed,
    ];

    /// 已被领取、尚未上报结果的状态
    pub const IN_FLIGHT: [QueueStatus; 3] = [
        QueueStatus::OnFlight,
        QueueStatus::Sent,
        QueueStatus::Processing,
    ];

    /// 不占用分类活跃名额的状态
    pub const INACTIVE: [QueueStatus; 3] = [
        QueueStatus::Completed,
        QueueStatus::Failed,
        QueueStatus::Hold,
    ];

    pub const TERMINAL: [QueueStatus; 2] = [QueueStatus::Completed, QueueStatus::Failed];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    pub fn is_in_flight(&self) -> bool {
        Self::IN_FLIGHT.contains(self)
    }

    /// 是否占用所在分类的唯一活跃名额
    pub fn is_active(&self) -> bool {
        !Self::INACTIVE.contains(self)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueStatus::New => write!(f, "new"),
            QueueStatus::Hold => write!(f, "hold"),
            QueueStatus::OnFlight => write!(f, "on_flight"),
            QueueStatus::Sent => write!(f, "sent"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Completed => write!(f, "completed"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for QueueStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(QueueStatus::New),
            "hold" => Ok(QueueStatus::Hold),
            "on_flight" => Ok(QueueStatus::OnFlight),
            "sent" => Ok(QueueStatus::Sent),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Unknown queue status: {0}")]
    UnknownStatus(String),

    #[error("Unknown queue priority: {0}")]
    UnknownPriority(String),
}

/// 入队请求
///
/// 生产者提交的队列项。缺失的路由字段会被反序列化为空字符串，
/// 统一由校验逻辑报告。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_sequential"))]
pub struct NewQueueItem {
    #[serde(default)]
    #[validate(length(min = 1, message = "action is required"))]
    pub action: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "event is required"))]
    pub event: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "destination is required"))]
    pub destination: String,
    #[serde(default)]
    pub priority: QueuePriority,
    #[serde(default)]
    #[validate(custom(function = "validate_params"))]
    pub params: serde_json::Value,
    #[serde(default)]
    pub is_sequential: bool,
    #[validate(length(min = 1, message = "sequentialCategory cannot be empty"))]
    pub sequential_category: Option<String>,
}

impl NewQueueItem {
    pub fn new(
        action: impl Into<String>,
        event: impl Into<String>,
        destination: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            action: action.into(),
            event: event.into(),
            destination: destination.into(),
            priority: QueuePriority::Regular,
            params,
            is_sequential: false,
            sequential_category: None,
        }
    }

    /// 标记为顺序执行并指定分类
    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.is_sequential = true;
        self.sequential_category = Some(category.into());
        self
    }

    pub fn with_priority(mut self, priority: QueuePriority) -> Self {
        self.priority = priority;
        self
    }
}

fn validate_params(params: &serde_json::Value) -> Result<(), ValidationError> {
    let empty = match params {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    };

    if empty {
        let mut err = ValidationError::new("params_empty");
        err.message = Some("params cannot be empty".into());
        return Err(err);
    }
    Ok(())
}

fn validate_sequential(item: &NewQueueItem) -> Result<(), ValidationError> {
    if item.is_sequential && item.sequential_category.is_none() {
        let mut err = ValidationError::new("sequential_category_required");
        err.message = Some("sequential items require a sequentialCategory".into());
        return Err(err);
    }
    Ok(())
}

/// 重试计数的变更方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryChange {
    #[default]
    Keep,
    Increment,
    /// 仅用于人工干预
    Reset,
}

/// 历史记录的写入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    #[default]
    Skip,
    /// 记录变更前的快照（强制恢复）
    PreImage,
    /// 记录变更后的快照（工作器上报）
    PostImage,
}

/// 队列项补丁
///
/// 描述一次状态迁移要修改的字段。`None` 表示不修改该字段。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueItemPatch {
    pub status: Option<QueueStatus>,
    pub priority: Option<QueuePriority>,
    pub flight_at: Option<Option<DateTime<FixedOffset>>>,
    pub completed_at: Option<Option<DateTime<FixedOffset>>>,
    pub error_details: Option<Option<serde_json::Value>>,
    pub retry: RetryChange,
    pub history: HistoryMode,
}

impl QueueItemPatch {
    pub fn status(status: QueueStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// 强制恢复：记录快照、重试次数加一
    pub fn recovery(status: QueueStatus) -> Self {
        Self {
            status: Some(status),
            retry: RetryChange::Increment,
            history: HistoryMode::PreImage,
            ..Default::default()
        }
    }

    /// 是否需要基于文档当前值计算（无法用单条批量 UPDATE 表达）
    pub fn needs_document(&self) -> bool {
        self.history != HistoryMode::Skip
    }
}

impl QueueItem {
    /// 根据入队请求创建队列项
    pub fn from_new(new: NewQueueItem, status: QueueStatus) -> Self {
        let now: DateTime<FixedOffset> = Utc::now().into();
        let is_sequential = new.is_sequential || new.sequential_category.is_some();
        Self {
            id: Uuid::now_v7(),
            action: new.action,
            event: new.event,
            destination: new.destination,
            params: new.params,
            priority: new.priority,
            status,
            is_sequential,
            sequential_category: new.sequential_category,
            no_of_retry: 0,
            flight_at: None,
            completed_at: None,
            error_details: None,
            history: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 非空的顺序分类
    pub fn category(&self) -> Option<&str> {
        self.sequential_category
            .as_deref()
            .filter(|category| !category.is_empty())
    }

    fn snapshot(&self, at: DateTime<FixedOffset>) -> HistoryEntry {
        HistoryEntry {
            status: self.status,
            flight_at: self.flight_at,
            no_of_retry: self.no_of_retry,
            error_details: self.error_details.clone(),
            recorded_at: at,
        }
    }

    /// 计算应用补丁后的文档，不修改自身
    ///
    /// 返回值的 `revision` 比当前值大一，供比较并更新使用。
    pub fn apply(&self, patch: &QueueItemPatch, now: DateTime<FixedOffset>) -> QueueItem {
        let mut next = self.clone();

        if patch.history == HistoryMode::PreImage {
            next.history.push(self.snapshot(now));
        }

        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(flight_at) = patch.flight_at {
            next.flight_at = flight_at;
        }
        if let Some(completed_at) = patch.completed_at {
            next.completed_at = completed_at;
        }
        if let Some(error_details) = &patch.error_details {
            next.error_details = error_details.clone();
        }

        match patch.retry {
            RetryChange::Keep => {}
            RetryChange::Increment => next.no_of_retry += 1,
            RetryChange::Reset => next.no_of_retry = 0,
        }

        if patch.history == HistoryMode::PostImage {
            let entry = next.snapshot(now);
            next.history.push(entry);
        }

        next.revision = self.revision + 1;
        next.updated_at = now;
        next
    }
}

#[cfg(test)]
#[path = "queue_item_test.rs"]
mod tests;
