//! Gateway service wiring: provider, relay client, repository and router

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::Router;
use chatdesk_core::{
    ChatdeskError, ChatdeskService, DependencyStatus, HealthStatus, ReadinessStatus, Result,
};
use tracing::info;

use crate::api::{create_router, AppState};
use crate::chat_relay::ChatRelayClient;
use crate::config::GatewayConfig;
use crate::repository::{InMemoryMessageRepository, MessageRepository};
use crate::selector::{Provider, ProviderSelector};

#[derive(Clone)]
pub struct WhatsAppGatewayService {
    http_bind: String,
    provider: Provider,
    chat_relay: Arc<ChatRelayClient>,
    repository: Arc<dyn MessageRepository>,
    start_time: Instant,
}

impl WhatsAppGatewayService {
    /// Build every configured client. Messages are kept in memory until
    /// [`with_repository`](Self::with_repository) swaps the store.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http_bind = config.http_bind.clone();
        let chat_relay = Arc::new(ChatRelayClient::new(&config.chat_relay)?);
        let provider = ProviderSelector::from_config(config)?.into_provider();

        Ok(Self {
            http_bind,
            provider,
            chat_relay,
            repository: Arc::new(InMemoryMessageRepository::new()),
            start_time: Instant::now(),
        })
    }

    pub fn with_repository(mut self, repository: Arc<dyn MessageRepository>) -> Self {
        self.repository = repository;
        self
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn chat_relay(&self) -> &Arc<ChatRelayClient> {
        &self.chat_relay
    }

    pub fn repository(&self) -> &Arc<dyn MessageRepository> {
        &self.repository
    }

    pub fn router(&self) -> Router {
        create_router(AppState::from_service(self))
    }
}

#[async_trait]
impl ChatdeskService for WhatsAppGatewayService {
    fn service_id(&self) -> &'static str {
        "whatsapp-gateway"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Ready once the active provider has its credentials
    async fn ready(&self) -> ReadinessStatus {
        let provider = self.provider.as_dyn();
        let configured = provider.is_configured();

        ReadinessStatus {
            ready: configured,
            dependencies: vec![DependencyStatus {
                name: provider.kind().to_string(),
                available: configured,
                latency_ms: None,
            }],
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!(
            uptime_seconds = self.start_time.elapsed().as_secs(),
            "Shutting down WhatsApp Gateway"
        );
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(
            bind = %self.http_bind,
            provider = %self.provider.kind(),
            chat_relay = %self.chat_relay.base_url(),
            "Starting HTTP server"
        );

        let listener = tokio::net::TcpListener::bind(&self.http_bind).await?;
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ChatdeskError::Internal(e.to_string()))?;

        Ok(())
    }
}
