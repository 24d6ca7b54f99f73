//! # Durable MCP Monitoring
//!
//! Request metrics, process saturation sampling, and health checking for the
//! tool-call service. The metrics stage records every request here; the
//! saturation sampler periodically captures process memory, CPU, and the
//! live phase-worker count.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

pub mod health;
pub mod metrics;

pub use health::{HealthCheck, HealthCheckResult, HealthChecker, HealthStatus};
pub use metrics::{MetricsCollector, RequestTimer, ServiceMetrics};

/// Bundles the collector and health checker handed to stages and handlers.
#[derive(Clone)]
pub struct MonitoringSystem {
    metrics_collector: Arc<MetricsCollector>,
    health_checker: Arc<HealthChecker>,
}

impl MonitoringSystem {
    pub fn new() -> Self {
        Self {
            metrics_collector: Arc::new(MetricsCollector::new()),
            health_checker: Arc::new(HealthChecker::new()),
        }
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    pub fn health(&self) -> Arc<HealthChecker> {
        self.health_checker.clone()
    }
}

impl Default for MonitoringSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the background task that samples process saturation.
pub fn start_saturation_sampler(collector: Arc<MetricsCollector>, interval: Duration) {
    tokio::spawn(async move {
        let mut system = sysinfo::System::new();
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => pid,
            Err(err) => {
                warn!("saturation sampler disabled: {}", err);
                return;
            }
        };
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            system.refresh_all();
            if let Some(process) = system.process(pid) {
                collector
                    .update_saturation(process.memory(), f64::from(process.cpu_usage()))
                    .await;
            }
        }
    });
}
