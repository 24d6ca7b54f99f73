//! Health checking for the tool-call service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HealthStatus {
    /// Service is healthy
    Healthy,
    /// Service is degraded but functional
    Degraded(String),
    /// Service is unhealthy
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded(msg) => write!(f, "DEGRADED: {msg}"),
            HealthStatus::Unhealthy(msg) => write!(f, "UNHEALTHY: {msg}"),
        }
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub duration: Duration,
    pub timestamp: SystemTime,
}

/// Health check trait for custom health checks
#[async_trait::async_trait]
pub trait HealthCheck: Send + Sync {
    /// Name of the health check
    fn name(&self) -> &str;

    /// Perform the health check
    async fn check(&self) -> HealthCheckResult;
}

/// Aggregates registered health checks into one status.
pub struct HealthChecker {
    checks: Arc<RwLock<Vec<Box<dyn HealthCheck>>>>,
    last_results: Arc<RwLock<HashMap<String, HealthCheckResult>>>,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checks: Arc::new(RwLock::new(Vec::new())),
            last_results: Arc::new(RwLock::new(HashMap::new())),
            start_time: Instant::now(),
        }
    }

    pub async fn add_check(&self, check: Box<dyn HealthCheck>) {
        let mut checks = self.checks.write().await;
        checks.push(check);
    }

    /// Run all health checks, worst result wins.
    pub async fn check_all(&self) -> HealthStatus {
        let checks = self.checks.read().await;
        let mut degraded_reasons = Vec::new();
        let mut unhealthy_reasons = Vec::new();

        for check in checks.iter() {
            let result = check.check().await;
            let name = check.name();

            {
                let mut results = self.last_results.write().await;
                results.insert(name.to_string(), result.clone());
            }

            match result.status {
                HealthStatus::Healthy => {}
                HealthStatus::Degraded(reason) => {
                    degraded_reasons.push(format!("{name}: {reason}"));
                }
                HealthStatus::Unhealthy(reason) => {
                    unhealthy_reasons.push(format!("{name}: {reason}"));
                }
            }
        }

        if !unhealthy_reasons.is_empty() {
            HealthStatus::Unhealthy(unhealthy_reasons.join(", "))
        } else if !degraded_reasons.is_empty() {
            HealthStatus::Degraded(degraded_reasons.join(", "))
        } else {
            HealthStatus::Healthy
        }
    }

    pub async fn last_results(&self) -> HashMap<String, HealthCheckResult> {
        self.last_results.read().await.clone()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticCheck {
        name: String,
        status: HealthStatus,
    }

    #[async_trait::async_trait]
    impl HealthCheck for StaticCheck {
        fn name(&self) -> &str {
            &self.name
        }

        async fn check(&self) -> HealthCheckResult {
            HealthCheckResult {
                status: self.status.clone(),
                duration: Duration::ZERO,
                timestamp: SystemTime::now(),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_checker_is_healthy() {
        let checker = HealthChecker::new();
        assert_eq!(checker.check_all().await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let checker = HealthChecker::new();
        checker
            .add_check(Box::new(StaticCheck {
                name: "store".to_string(),
                status: HealthStatus::Degraded("slow".to_string()),
            }))
            .await;
        checker
            .add_check(Box::new(StaticCheck {
                name: "queue".to_string(),
                status: HealthStatus::Unhealthy("down".to_string()),
            }))
            .await;

        match checker.check_all().await {
            HealthStatus::Unhealthy(reason) => assert!(reason.contains("queue")),
            other => panic!("expected unhealthy, got {other}"),
        }
        assert_eq!(checker.last_results().await.len(), 2);
    }
}
