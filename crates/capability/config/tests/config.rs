use dsr_config::{AppConfig, LateReportSetting, OverflowSetting, StrategySetting};
use std::time::Duration;

// 环境变量为进程级全局状态，所有断言放在同一个测试中顺序执行。
#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("DSR_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("DSR_STALE_AFTER_SECONDS", "5");
        std::env::set_var("DSR_OFFLINE_AFTER_SECONDS", "15");
        std::env::set_var("DSR_SWEEP_PERIOD_MS", "250");
        std::env::set_var("DSR_SUBSCRIBER_OVERFLOW", "drop_newest");
        std::env::set_var("DSR_STALENESS_STRATEGY", "lazy");
        std::env::set_var("DSR_LATE_REPORT_POLICY", "merge_payload");
        std::env::set_var("DSR_LOG_TRANSITIONS", "off");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.stale_after, Duration::from_secs(5));
    assert_eq!(config.offline_after, Duration::from_secs(15));
    assert_eq!(config.sweep_period, Duration::from_millis(250));
    assert_eq!(config.subscriber_queue_capacity, 256);
    assert_eq!(config.subscriber_overflow, OverflowSetting::DropNewest);
    assert_eq!(config.staleness_strategy, StrategySetting::Lazy);
    assert_eq!(config.late_report_policy, LateReportSetting::MergePayload);
    assert!(!config.log_transitions);

    unsafe {
        std::env::set_var("DSR_STORE_SHARDS", "many");
    }
    let err = AppConfig::from_env().expect_err("invalid shards");
    assert_eq!(err.to_string(), "invalid value for DSR_STORE_SHARDS: many");

    unsafe {
        std::env::remove_var("DSR_STORE_SHARDS");
        std::env::set_var("DSR_SUBSCRIBER_OVERFLOW", "block");
    }
    let err = AppConfig::from_env().expect_err("invalid overflow");
    assert!(err.to_string().contains("DSR_SUBSCRIBER_OVERFLOW"));
}
