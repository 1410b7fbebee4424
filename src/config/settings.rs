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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含数据库、服务器、两个清理工作器以及指标导出的配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 服务器配置
    pub server: ServerSettings,
    /// 非顺序队列项的超时恢复配置
    pub staleness: StalenessSettings,
    /// 顺序队列项的清理配置
    pub sequential: SequentialSettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
    /// 是否输出SQL日志
    #[serde(default)]
    pub sqlx_logging: bool,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 超时恢复配置
#[derive(Debug, Clone, Deserialize)]
pub struct StalenessSettings {
    /// 是否启动后台扫描
    pub enabled: bool,
    /// 扫描间隔（秒）
    pub interval_secs: u64,
    /// 领取后多久未上报视为卡住（分钟）
    pub timeout_minutes: i64,
    /// 自动恢复次数上限
    pub retry_cap: i32,
}

impl Default for StalenessSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            timeout_minutes: 20,
            retry_cap: 4,
        }
    }
}

impl StalenessSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.timeout_minutes)
    }
}

/// 顺序清理配置
#[derive(Debug, Clone, Deserialize)]
pub struct SequentialSettings {
    /// 是否启动后台清理
    pub enabled: bool,
    /// 清理间隔（秒）
    pub interval_secs: u64,
    /// 活跃项多久未更新视为卡住（分钟）
    pub stale_timeout_minutes: i64,
    /// hold 项多久未更新视为被遗忘（分钟）
    pub failed_timeout_minutes: i64,
    /// 自动恢复次数上限
    pub retry_cap: i32,
    /// 单轮最多处理的候选项数量
    pub batch_limit: u64,
}

impl Default for SequentialSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            stale_timeout_minutes: 20,
            failed_timeout_minutes: 5,
            retry_cap: 4,
            batch_limit: 50,
        }
    }
}

impl SequentialSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stale_timeout_minutes)
    }

    pub fn failed_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.failed_timeout_minutes)
    }
}

/// 指标导出配置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启动 Prometheus 导出器
    pub enabled: bool,
    /// 导出器监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次读取内置默认值、`config/default`、`config/{APP_ENVIRONMENT}`
    /// 和 `QUEUEKEEPER__` 前缀的环境变量，后者覆盖前者。
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("QUEUEKEEPER").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// 只包含内置默认值的配置构建器
    pub fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let staleness = StalenessSettings::default();
        let sequential = SequentialSettings::default();

        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite::memory:")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("database.sqlx_logging", false)?
            .set_default("staleness.enabled", staleness.enabled)?
            .set_default("staleness.interval_secs", staleness.interval_secs)?
            .set_default("staleness.timeout_minutes", staleness.timeout_minutes)?
            .set_default("staleness.retry_cap", staleness.retry_cap)?
            .set_default("sequential.enabled", sequential.enabled)?
            .set_default("sequential.interval_secs", sequential.interval_secs)?
            .set_default("sequential.stale_timeout_minutes", sequential.stale_timeout_minutes)?
            .set_default("sequential.failed_timeout_minutes", sequential.failed_timeout_minutes)?
            .set_default("sequential.retry_cap", sequential.retry_cap)?
            .set_default("sequential.batch_limit", sequential.batch_limit)?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
