//! 设备状态注册表 HTTP 服务。
//!
//! 启动流程：加载 .env → 读取配置 → 初始化日志 → 构建注册表 →
//! 挂载日志订阅者 → 启动周期扫描 → 监听 HTTP；Ctrl-C 时停止扫描并排空事件队列。

mod handlers;
mod middleware;
mod routes;
mod utils;

use axum::Router;
use dsr_config::{AppConfig, LateReportSetting, OverflowSetting, StrategySetting};
use dsr_registry::{
    DeviceRegistry, LateReportPolicy, LogListener, NotifierConfig, OverflowPolicy, RegistryConfig,
    RegistryError, StalenessStrategy,
};
use dsr_telemetry::init_tracing;
use domain::Thresholds;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub registry: DeviceRegistry,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let registry = build_registry(&config)?;
    let shutdown = CancellationToken::new();
    let sweeper = registry.spawn_sweeper(shutdown.child_token());

    let state = AppState {
        registry: registry.clone(),
    };
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "dsr.service", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    registry.shutdown().await;
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    info!(target: "dsr.service", "service_stopped");
    Ok(())
}

/// 构建注册表；`log_transitions` 开启时挂载唯一输出 info 级变迁日志的 LogListener。
pub fn build_registry(config: &AppConfig) -> Result<DeviceRegistry, RegistryError> {
    let registry = DeviceRegistry::with_monotonic_clock(registry_config(config))?;
    if config.log_transitions {
        registry.subscribe(Arc::new(LogListener))?;
    }
    Ok(registry)
}

/// 组装路由与中间件。
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_api_router())
        .with_state(state)
        // 注入 request_id/trace_id
        .layer(axum::middleware::from_fn(middleware::request_context))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// 环境配置 → 注册表参数。
pub fn registry_config(config: &AppConfig) -> RegistryConfig {
    RegistryConfig {
        thresholds: Thresholds {
            stale_after: config.stale_after,
            offline_after: config.offline_after,
        },
        sweep_period: config.sweep_period,
        notifier: NotifierConfig {
            queue_capacity: config.subscriber_queue_capacity,
            overflow: match config.subscriber_overflow {
                OverflowSetting::DropOldest => OverflowPolicy::DropOldest,
                OverflowSetting::DropNewest => OverflowPolicy::DropNewest,
            },
        },
        strategy: match config.staleness_strategy {
            StrategySetting::Sweep => StalenessStrategy::ActiveSweep,
            StrategySetting::Lazy => StalenessStrategy::Lazy,
        },
        late_report_policy: match config.late_report_policy {
            LateReportSetting::Reject => LateReportPolicy::Reject,
            LateReportSetting::MergePayload => LateReportPolicy::MergePayload,
        },
        store_shards: config.store_shards,
        history_limit: config.history_limit,
        ..RegistryConfig::default()
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::warn!(target: "dsr.service", error = %err, "ctrl_c_listen_failed");
            }
            info!(target: "dsr.service", "shutdown_requested");
        }
        _ = cancel.cancelled() => {}
    }
}
