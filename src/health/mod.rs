/// Health checking for registered connections

use crate::command;
use crate::core::backend::BackendHandle;
use crate::core::router::ConnectionRouter;
use crate::utils::format_duration;
use async_trait::async_trait;
use futures::future::join_all;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Health status of a connection
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy { reason: String },
    Timeout,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Unhealthy { reason } => write!(f, "Unhealthy: {}", reason),
            HealthStatus::Timeout => write!(f, "Timeout"),
        }
    }
}

impl HealthStatus {
    /// Check if the status represents a healthy connection
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Health checker trait
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Perform health check on a handle
    async fn check_health(&self, handle: &BackendHandle) -> HealthStatus;

    /// Get the check interval for this health checker
    fn check_interval(&self) -> Duration;

    /// Get the timeout for health checks
    fn check_timeout(&self) -> Duration;
}

/// PING-based checker
pub struct PingHealthChecker {
    check_interval: Duration,
    check_timeout: Duration,
}

impl PingHealthChecker {
    pub fn new() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            check_timeout: Duration::from_secs(3),
        }
    }

    pub fn with_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    pub fn with_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }
}

impl Default for PingHealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthChecker for PingHealthChecker {
    async fn check_health(&self, handle: &BackendHandle) -> HealthStatus {
        match handle
            .query::<String>("PING", &command::ping().to_cmd())
            .await
        {
            Ok(reply) if reply == "PONG" => HealthStatus::Healthy,
            Ok(reply) => HealthStatus::Unhealthy {
                reason: format!("Unexpected PING response: {}", reply),
            },
            Err(err) => HealthStatus::Unhealthy {
                reason: err.to_string(),
            },
        }
    }

    fn check_interval(&self) -> Duration {
        self.check_interval
    }

    fn check_timeout(&self) -> Duration {
        self.check_timeout
    }
}

/// Result of checking one connection
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub name: String,
    pub address: String,
    pub status: HealthStatus,
    pub latency: Duration,
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} in {}",
            self.name,
            self.address,
            self.status,
            format_duration(self.latency)
        )
    }
}

/// Generic health check manager
pub struct HealthCheckManager {
    checker: Box<dyn HealthChecker>,
}

impl HealthCheckManager {
    pub fn new(checker: Box<dyn HealthChecker>) -> Self {
        Self { checker }
    }

    /// Perform health check with timeout
    pub async fn check_handle(&self, handle: &BackendHandle) -> HealthReport {
        let started = Instant::now();
        let status = match timeout(self.checker.check_timeout(), self.checker.check_health(handle)).await {
            Ok(status) => status,
            Err(_) => HealthStatus::Timeout,
        };

        HealthReport {
            name: handle.name().to_string(),
            address: handle.address(),
            status,
            latency: started.elapsed(),
        }
    }

    /// Check every registered connection concurrently, ordered by name
    pub async fn check_router(&self, router: &ConnectionRouter) -> Vec<HealthReport> {
        let mut handles = Vec::new();
        for name in router.names().await {
            if let Some(handle) = router.handle(&name).await {
                handles.push(handle);
            }
        }

        join_all(handles.iter().map(|handle| self.check_handle(handle))).await
    }

    /// Run continuous health checking for every connection of the router
    pub async fn run_health_checks(&self, router: &ConnectionRouter) {
        let mut interval = tokio::time::interval(self.checker.check_interval());

        loop {
            interval.tick().await;

            for report in self.check_router(router).await {
                match &report.status {
                    HealthStatus::Healthy => {
                        tracing::debug!("Connection {} is healthy", report.name);
                    }
                    HealthStatus::Unhealthy { reason } => {
                        tracing::warn!("Connection {} is unhealthy: {}", report.name, reason);
                    }
                    HealthStatus::Timeout => {
                        tracing::warn!("Health check timeout for connection {}", report.name);
                    }
                }
            }
        }
    }
}
