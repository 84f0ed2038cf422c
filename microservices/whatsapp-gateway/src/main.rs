use std::sync::Arc;

use chatdesk_core::{MicroserviceRuntime, Result, ServiceConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use whatsapp_gateway::{GatewayConfig, WhatsAppGatewayService};

#[tokio::main]
async fn main() -> Result<()> {
    let service_config = ServiceConfig::from_env();

    // RUST_LOG wins; LOG_LEVEL is the fallback
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(service_config.log_directive())),
        )
        .json()
        .init();

    info!(service_name = %service_config.service_name, "Starting WhatsApp Gateway");

    let service = Arc::new(WhatsAppGatewayService::new(GatewayConfig::from_env())?);
    MicroserviceRuntime::new(service_config).run(service).await
}
