//! Metrics collection for the tool-call service.
//!
//! Tracks request counts, latency, and 5xx responses on a rolling
//! per-minute window, plus the most recent process saturation sample.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tracing::debug;

/// A counter that resets when the wall-clock minute rolls over.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MinuteCounter {
    minute: u64,
    value: u64,
}

impl MinuteCounter {
    fn add(&mut self, now_minute: u64, amount: u64) {
        if self.minute != now_minute {
            self.minute = now_minute;
            self.value = 0;
        }
        self.value += amount;
    }

    fn read(&self, now_minute: u64) -> u64 {
        if self.minute == now_minute {
            self.value
        } else {
            0
        }
    }
}

/// Request-level metrics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RequestMetrics {
    pub total_requests: u64,
    pub requests_this_minute: MinuteCounter,
    pub latency_ms_this_minute: MinuteCounter,
    pub server_errors_total: u64,
    pub server_errors_this_minute: MinuteCounter,
    pub average_latency_ms: f64,
    pub method_counts: HashMap<String, u64>,
}

/// Most recent process saturation sample.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SaturationMetrics {
    pub memory_bytes: u64,
    pub cpu_percent: f64,
    pub phase_workers: u64,
}

/// Snapshot of everything the collector tracks.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ServiceMetrics {
    pub request: RequestMetrics,
    pub saturation: SaturationMetrics,
}

/// Metrics collector shared by the metrics stage, the phase manager, and the
/// saturation sampler.
pub struct MetricsCollector {
    metrics: Arc<RwLock<ServiceMetrics>>,
    phase_workers: AtomicUsize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(ServiceMetrics::default())),
            phase_workers: AtomicUsize::new(0),
        }
    }

    fn now_minute() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() / 60)
            .unwrap_or(0)
    }

    /// Record one completed request.
    pub async fn record_request(&self, method: &str, status: u16, latency: Duration) {
        let minute = Self::now_minute();
        let latency_ms = latency.as_millis() as u64;
        let mut metrics = self.metrics.write().await;
        let request = &mut metrics.request;

        request.total_requests += 1;
        request.requests_this_minute.add(minute, 1);
        request.latency_ms_this_minute.add(minute, latency_ms);
        if status >= 500 {
            request.server_errors_total += 1;
            request.server_errors_this_minute.add(minute, 1);
        }
        *request.method_counts.entry(method.to_string()).or_insert(0) += 1;

        let total = request.total_requests as f64;
        request.average_latency_ms =
            (request.average_latency_ms * (total - 1.0) + latency_ms as f64) / total;

        debug!(
            "recorded request: method={}, status={}, latency_ms={}",
            method, status, latency_ms
        );
    }

    /// Record a saturation sample (worker count is read from the gauge).
    pub async fn update_saturation(&self, memory_bytes: u64, cpu_percent: f64) {
        let workers = self.phase_workers.load(Ordering::Relaxed) as u64;
        let mut metrics = self.metrics.write().await;
        metrics.saturation = SaturationMetrics {
            memory_bytes,
            cpu_percent,
            phase_workers: workers,
        };
    }

    /// Bump the live phase-worker gauge; the guard decrements on drop.
    pub fn phase_worker_started(self: &Arc<Self>) -> PhaseWorkerGuard {
        self.phase_workers.fetch_add(1, Ordering::Relaxed);
        PhaseWorkerGuard {
            collector: self.clone(),
        }
    }

    pub fn active_phase_workers(&self) -> usize {
        self.phase_workers.load(Ordering::Relaxed)
    }

    pub async fn get_metrics(&self) -> ServiceMetrics {
        let minute = Self::now_minute();
        let mut snapshot = self.metrics.read().await.clone();
        // Expired windows read as zero.
        let request = &mut snapshot.request;
        request.requests_this_minute = MinuteCounter {
            minute,
            value: request.requests_this_minute.read(minute),
        };
        request.latency_ms_this_minute = MinuteCounter {
            minute,
            value: request.latency_ms_this_minute.read(minute),
        };
        request.server_errors_this_minute = MinuteCounter {
            minute,
            value: request.server_errors_this_minute.read(minute),
        };
        snapshot.saturation.phase_workers = self.phase_workers.load(Ordering::Relaxed) as u64;
        snapshot
    }

    pub async fn export_json(&self) -> serde_json::Result<String> {
        let metrics = self.get_metrics().await;
        serde_json::to_string_pretty(&metrics)
    }

    /// Export metrics in Prometheus text format.
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics().await;
        let mut output = String::new();

        output.push_str("# HELP toolcalls_requests_total Total number of requests\n");
        output.push_str("# TYPE toolcalls_requests_total counter\n");
        output.push_str(&format!(
            "toolcalls_requests_total {}\n",
            metrics.request.total_requests
        ));

        output.push_str("# HELP toolcalls_requests_per_minute Requests in the current minute\n");
        output.push_str("# TYPE toolcalls_requests_per_minute gauge\n");
        output.push_str(&format!(
            "toolcalls_requests_per_minute {}\n",
            metrics.request.requests_this_minute.value
        ));

        output.push_str("# HELP toolcalls_latency_ms_per_minute Latency spent in the current minute\n");
        output.push_str("# TYPE toolcalls_latency_ms_per_minute gauge\n");
        output.push_str(&format!(
            "toolcalls_latency_ms_per_minute {}\n",
            metrics.request.latency_ms_this_minute.value
        ));

        output.push_str("# HELP toolcalls_server_errors_total Total 5xx responses\n");
        output.push_str("# TYPE toolcalls_server_errors_total counter\n");
        output.push_str(&format!(
            "toolcalls_server_errors_total {}\n",
            metrics.request.server_errors_total
        ));

        output.push_str("# HELP toolcalls_memory_bytes Process memory usage\n");
        output.push_str("# TYPE toolcalls_memory_bytes gauge\n");
        output.push_str(&format!(
            "toolcalls_memory_bytes {}\n",
            metrics.saturation.memory_bytes
        ));

        output.push_str("# HELP toolcalls_cpu_percent Process CPU usage\n");
        output.push_str("# TYPE toolcalls_cpu_percent gauge\n");
        output.push_str(&format!(
            "toolcalls_cpu_percent {}\n",
            metrics.saturation.cpu_percent
        ));

        output.push_str("# HELP toolcalls_phase_workers Live phase-manager workers\n");
        output.push_str("# TYPE toolcalls_phase_workers gauge\n");
        output.push_str(&format!(
            "toolcalls_phase_workers {}\n",
            metrics.saturation.phase_workers
        ));

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for the phase-worker gauge.
pub struct PhaseWorkerGuard {
    collector: Arc<MetricsCollector>,
}

impl Drop for PhaseWorkerGuard {
    fn drop(&mut self) {
        self.collector.phase_workers.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Timer for measuring request duration.
pub struct RequestTimer {
    start: Instant,
    method: String,
    metrics: Arc<MetricsCollector>,
}

impl RequestTimer {
    pub fn start(method: impl Into<String>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            start: Instant::now(),
            method: method.into(),
            metrics,
        }
    }

    /// Finish the timer and record the request.
    pub async fn finish(self, status: u16) {
        let latency = self.start.elapsed();
        self.metrics
            .record_request(&self.method, status, latency)
            .await;
    }
}
