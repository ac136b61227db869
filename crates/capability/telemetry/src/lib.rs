//! 追踪初始化、进程内计数器与请求 ID 生成。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub reports_accepted: u64,
    pub reports_late: u64,
    pub devices_registered: u64,
    pub transitions_online: u64,
    pub transitions_stale: u64,
    pub transitions_offline: u64,
    pub events_published: u64,
    pub events_dropped: u64,
    pub delivery_failures: u64,
    pub sweeps: u64,
    pub sweep_duration_us_total: u64,
}

/// 进程内计数器。
pub struct TelemetryMetrics {
    reports_accepted: AtomicU64,
    reports_late: AtomicU64,
    devices_registered: AtomicU64,
    transitions_online: AtomicU64,
    transitions_stale: AtomicU64,
    transitions_offline: AtomicU64,
    events_published: AtomicU64,
    events_dropped: AtomicU64,
    delivery_failures: AtomicU64,
    sweeps: AtomicU64,
    sweep_duration_us_total: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            reports_accepted: AtomicU64::new(0),
            reports_late: AtomicU64::new(0),
            devices_registered: AtomicU64::new(0),
            transitions_online: AtomicU64::new(0),
            transitions_stale: AtomicU64::new(0),
            transitions_offline: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            sweep_duration_us_total: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reports_accepted: self.reports_accepted.load(Ordering::Relaxed),
            reports_late: self.reports_late.load(Ordering::Relaxed),
            devices_registered: self.devices_registered.load(Ordering::Relaxed),
            transitions_online: self.transitions_online.load(Ordering::Relaxed),
            transitions_stale: self.transitions_stale.load(Ordering::Relaxed),
            transitions_offline: self.transitions_offline.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweep_duration_us_total: self.sweep_duration_us_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录被采纳的上报次数。
pub fn record_report_accepted() {
    metrics().reports_accepted.fetch_add(1, Ordering::Relaxed);
}

/// 记录乱序（过期时间戳）上报次数。
pub fn record_report_late() {
    metrics().reports_late.fetch_add(1, Ordering::Relaxed);
}

/// 记录新设备注册次数。
pub fn record_device_registered() {
    metrics().devices_registered.fetch_add(1, Ordering::Relaxed);
}

/// 记录转为 Online 的变迁次数（含恢复）。
pub fn record_transition_online() {
    metrics().transitions_online.fetch_add(1, Ordering::Relaxed);
}

/// 记录转为 Stale 的变迁次数。
pub fn record_transition_stale() {
    metrics().transitions_stale.fetch_add(1, Ordering::Relaxed);
}

/// 记录转为 Offline 的变迁次数。
pub fn record_transition_offline() {
    metrics().transitions_offline.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布的事件数：每个成功入队的订阅者各计一次。
pub fn record_event_published() {
    metrics().events_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录因订阅者队列满而丢弃的事件数。
pub fn record_event_dropped() {
    metrics().events_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录订阅者处理失败次数。
pub fn record_delivery_failure() {
    metrics().delivery_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次扫描及其耗时（微秒）。
pub fn record_sweep(duration_us: u64) {
    let metrics = metrics();
    metrics.sweeps.fetch_add(1, Ordering::Relaxed);
    metrics
        .sweep_duration_us_total
        .fetch_add(duration_us, Ordering::Relaxed);
}
