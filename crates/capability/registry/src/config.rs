use crate::error::RegistryError;
use domain::Thresholds;
use dsr_notify::NotifierConfig;
use dsr_staleness::StalenessStrategy;
use dsr_storage::{DEFAULT_HISTORY_LIMIT, DEFAULT_SHARDS, LateReportPolicy};
use std::time::Duration;

/// 注册表参数。
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub thresholds: Thresholds,
    pub sweep_period: Duration,
    pub notifier: NotifierConfig,
    pub strategy: StalenessStrategy,
    pub late_report_policy: LateReportPolicy,
    pub store_shards: usize,
    pub history_limit: usize,
    /// 关闭时等待订阅者排空队列的上限。
    pub shutdown_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds {
                stale_after: Duration::from_secs(60),
                offline_after: Duration::from_secs(180),
            },
            sweep_period: Duration::from_secs(1),
            notifier: NotifierConfig::default(),
            strategy: StalenessStrategy::default(),
            late_report_policy: LateReportPolicy::default(),
            store_shards: DEFAULT_SHARDS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), RegistryError> {
        self.thresholds
            .validate()
            .map_err(|err| RegistryError::InvalidConfiguration(err.to_string()))?;
        if self.sweep_period.is_zero() {
            return Err(invalid("sweep_period must be greater than zero"));
        }
        if self.notifier.queue_capacity == 0 {
            return Err(invalid("subscriber queue capacity must be greater than zero"));
        }
        if self.store_shards == 0 {
            return Err(invalid("store_shards must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> RegistryError {
    RegistryError::InvalidConfiguration(message.to_string())
}
