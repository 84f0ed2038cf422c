//! Service infrastructure shared by chatdesk services

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::error::{ChatdeskError, Result};

/// Health status for liveness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub service_id: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Readiness status for readiness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub dependencies: Vec<DependencyStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
    pub latency_ms: Option<u64>,
}

/// Standard trait every service implements
#[async_trait]
pub trait ChatdeskService: Send + Sync + 'static {
    /// Service identifier (e.g., "whatsapp-gateway")
    fn service_id(&self) -> &'static str;

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Health check - is the service alive?
    async fn health(&self) -> HealthStatus;

    /// Readiness check - are the configured backends usable?
    async fn ready(&self) -> ReadinessStatus;

    async fn shutdown(&self) -> Result<()>;

    /// Start the service (HTTP servers, etc.)
    async fn start(&self) -> Result<()>;
}

/// Standard service runtime bootstrap
pub struct MicroserviceRuntime {
    config: ServiceConfig,
    start_time: std::time::Instant,
}

impl MicroserviceRuntime {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            start_time: std::time::Instant::now(),
        }
    }

    /// Run a service until Ctrl+C or SIGTERM, then shut it down. Returns the
    /// service's error as soon as `start` fails.
    pub async fn run<S: ChatdeskService>(self, service: Arc<S>) -> Result<()> {
        info!(
            service_id = service.service_id(),
            service_name = %self.config.service_name,
            version = service.version(),
            "Starting service"
        );

        let service_clone = service.clone();
        let mut service_handle = tokio::spawn(async move { service_clone.start().await });

        let outcome = tokio::select! {
            joined = &mut service_handle => match joined {
                Ok(Ok(())) => {
                    info!("Service stopped on its own");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Service error: {}", e);
                    Err(e)
                }
                Err(e) => {
                    error!("Service task failed: {}", e);
                    Err(ChatdeskError::Internal(format!("service task failed: {}", e)))
                }
            },
            _ = Self::wait_for_shutdown() => {
                info!("Shutdown signal received, gracefully stopping...");
                Ok(())
            }
        };

        if let Err(e) = service.shutdown().await {
            warn!("Error during shutdown: {}", e);
        }

        service_handle.abort();

        info!(
            uptime_seconds = self.start_time.elapsed().as_secs(),
            "Service stopped"
        );

        outcome
    }

    async fn wait_for_shutdown() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}
