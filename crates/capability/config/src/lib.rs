//! 应用运行配置加载。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 订阅者队列满时的丢弃策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowSetting {
    DropOldest,
    DropNewest,
}

/// 过期判定方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategySetting {
    Sweep,
    Lazy,
}

/// 乱序上报处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LateReportSetting {
    Reject,
    MergePayload,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub stale_after: Duration,
    pub offline_after: Duration,
    pub sweep_period: Duration,
    pub subscriber_queue_capacity: usize,
    pub subscriber_overflow: OverflowSetting,
    pub staleness_strategy: StrategySetting,
    pub late_report_policy: LateReportSetting,
    pub store_shards: usize,
    pub history_limit: usize,
    pub log_transitions: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    ///
    /// 只做解析；阈值先后关系由注册表构造时校验。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr = env::var("DSR_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let stale_after =
            Duration::from_secs(read_u64_with_default("DSR_STALE_AFTER_SECONDS", 60)?);
        let offline_after =
            Duration::from_secs(read_u64_with_default("DSR_OFFLINE_AFTER_SECONDS", 180)?);
        let sweep_period =
            Duration::from_millis(read_u64_with_default("DSR_SWEEP_PERIOD_MS", 1000)?);
        let subscriber_queue_capacity =
            read_usize_with_default("DSR_SUBSCRIBER_QUEUE_CAPACITY", 256)?;
        let subscriber_overflow = match read_optional("DSR_SUBSCRIBER_OVERFLOW") {
            None => OverflowSetting::DropOldest,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "drop_oldest" | "oldest" => OverflowSetting::DropOldest,
                "drop_newest" | "newest" | "drop_new" => OverflowSetting::DropNewest,
                _ => return Err(ConfigError::Invalid("DSR_SUBSCRIBER_OVERFLOW".to_string(), value)),
            },
        };
        let staleness_strategy = match read_optional("DSR_STALENESS_STRATEGY") {
            None => StrategySetting::Sweep,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "sweep" | "active" => StrategySetting::Sweep,
                "lazy" => StrategySetting::Lazy,
                _ => return Err(ConfigError::Invalid("DSR_STALENESS_STRATEGY".to_string(), value)),
            },
        };
        let late_report_policy = match read_optional("DSR_LATE_REPORT_POLICY") {
            None => LateReportSetting::Reject,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "reject" => LateReportSetting::Reject,
                "merge_payload" | "merge" => LateReportSetting::MergePayload,
                _ => return Err(ConfigError::Invalid("DSR_LATE_REPORT_POLICY".to_string(), value)),
            },
        };
        let store_shards = read_usize_with_default("DSR_STORE_SHARDS", 16)?;
        let history_limit = read_usize_with_default("DSR_HISTORY_LIMIT", 50)?;
        let log_transitions = read_bool_with_default("DSR_LOG_TRANSITIONS", true);

        Ok(Self {
            http_addr,
            stale_after,
            offline_after,
            sweep_period,
            subscriber_queue_capacity,
            subscriber_overflow,
            staleness_strategy,
            late_report_policy,
            store_shards,
            history_limit,
            log_transitions,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
