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
/// 包含数据库、Redis、队列、调度、健康监控、快照和指标等所有配置项
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// Redis配置
    pub redis: RedisSettings,
    /// 优先级队列配置
    pub queue: QueueSettings,
    /// 调度配置
    pub scheduling: SchedulingSettings,
    /// 健康监控配置
    pub health: HealthSettings,
    /// 快照配置
    pub snapshot: SnapshotSettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
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
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(100),
            min_connections: Some(10),
            connect_timeout: Some(10),
            idle_timeout: Some(300),
        }
    }
}

/// Redis配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// Redis连接URL
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// 队列后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Redis 列表
    #[default]
    Redis,
    /// 进程内队列（单节点或测试）
    Memory,
}

/// 优先级队列配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// 队列后端
    pub backend: QueueBackend,
    /// Redis 键前缀
    pub key_prefix: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            key_prefix: "orchestrs".to_string(),
        }
    }
}

/// 调度配置设置
///
/// 所有时间单位为毫秒，除非字段名另有说明
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulingSettings {
    /// 低优先级队列晋升到中优先级的等待阈值（秒）
    pub low_to_medium_secs: u64,
    /// 中优先级队列晋升到高优先级的等待阈值（秒）
    pub medium_to_high_secs: u64,
    /// 失败重试退避基数
    pub retry_backoff_base_ms: u64,
    /// 失败重试退避上限
    pub retry_backoff_cap_ms: u64,
    /// 获取作业时事务冲突的最大重试次数
    pub acquire_max_attempts: u32,
    /// 获取作业重试的线性退避单位
    pub acquire_retry_backoff_ms: u64,
    /// 查找工作节点的最大重试次数
    pub worker_lookup_attempts: u32,
    /// 查找工作节点重试的线性退避单位
    pub worker_lookup_backoff_ms: u64,
    /// 队列轮询间隔
    pub poll_interval_ms: u64,
    /// 维护调度器（晋升、超时、健康刷新）的执行间隔
    pub maintenance_interval_ms: u64,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            low_to_medium_secs: 60,
            medium_to_high_secs: 120,
            retry_backoff_base_ms: 1_000,
            retry_backoff_cap_ms: 60_000,
            acquire_max_attempts: 3,
            acquire_retry_backoff_ms: 100,
            worker_lookup_attempts: 3,
            worker_lookup_backoff_ms: 100,
            poll_interval_ms: 50,
            maintenance_interval_ms: 5_000,
        }
    }
}

impl SchedulingSettings {
    pub fn low_to_medium(&self) -> Duration {
        Duration::from_secs(self.low_to_medium_secs)
    }

    pub fn medium_to_high(&self) -> Duration {
        Duration::from_secs(self.medium_to_high_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms.max(1))
    }
}

/// 健康监控配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// 低于该分数的节点标记为 DEGRADED
    pub degraded_threshold: f64,
    /// 预测失败所用的健康分数样本数
    pub prediction_window: u64,
    /// 预测所需的最少样本数
    pub min_prediction_samples: usize,
    /// 异常检测所用的样本数
    pub anomaly_window: u64,
    /// 异常检测的 z-score 阈值
    pub anomaly_z_threshold: f64,
    /// 健康分数采样间隔（秒），用于推算失败时间
    pub sampling_interval_secs: f64,
    /// 被视为即将失败的健康分数
    pub failure_floor: f64,
    /// 心跳超时，超过后节点标记为 FAILED
    pub heartbeat_timeout_ms: u64,
    /// 计算错误率所用的最近执行记录数
    pub error_rate_window: u64,
    /// 心跳时是否采样主机 CPU
    pub sample_cpu: bool,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            degraded_threshold: 0.5,
            prediction_window: 10,
            min_prediction_samples: 3,
            anomaly_window: 100,
            anomaly_z_threshold: 2.0,
            sampling_interval_secs: 30.0,
            failure_floor: 0.3,
            heartbeat_timeout_ms: 90_000,
            error_rate_window: 20,
            sample_cpu: true,
        }
    }
}

impl HealthSettings {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// 快照配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// 是否启用自动快照
    pub auto_enabled: bool,
    /// 自动快照间隔（秒）
    pub auto_interval_secs: u64,
    /// 自动快照保留时长（秒）
    pub retention_secs: u64,
    /// 向量维度
    pub vector_dimension: usize,
    /// 默认相似度阈值
    pub similarity_threshold: f32,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            auto_enabled: true,
            auto_interval_secs: 300,
            retention_secs: 86_400,
            vector_dimension: 64,
            similarity_threshold: 0.7,
        }
    }
}

impl SnapshotSettings {
    pub fn auto_interval(&self) -> Duration {
        Duration::from_secs(self.auto_interval_secs.max(1))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// 指标导出配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// 是否启用 Prometheus 导出
    pub enabled: bool,
    /// 监听地址
    pub listen_addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0:9000".to_string(),
        }
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从配置文件和环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default DB pool settings
            .set_default("database.url", "postgres://localhost/orchestrs")?
            .set_default("database.max_connections", 100)?
            .set_default("database.min_connections", 10)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            // Default queue settings
            .set_default("queue.backend", "redis")?
            .set_default("queue.key_prefix", "orchestrs")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("ORCHESTRS").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
