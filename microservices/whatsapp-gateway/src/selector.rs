//! Provider selection
//!
//! The provider is chosen once, from configuration, when the service starts.
//! It is held as a tagged variant so webhook entry points can reach
//! provider-specific parsers by matching on it.

use std::sync::Arc;

use tracing::info;

use crate::config::GatewayConfig;
use crate::providers::{
    AdapterResult, EvolutionProvider, MetaProvider, ProviderKind, TwilioProvider, WhatsAppProvider,
};

#[derive(Clone)]
pub enum Provider {
    Meta(Arc<MetaProvider>),
    Twilio(Arc<TwilioProvider>),
    Evolution(Arc<EvolutionProvider>),
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Meta(_) => ProviderKind::Meta,
            Self::Twilio(_) => ProviderKind::Twilio,
            Self::Evolution(_) => ProviderKind::Evolution,
        }
    }

    pub fn as_dyn(&self) -> &dyn WhatsAppProvider {
        match self {
            Self::Meta(p) => p.as_ref(),
            Self::Twilio(p) => p.as_ref(),
            Self::Evolution(p) => p.as_ref(),
        }
    }
}

/// Owns the active provider
pub struct ProviderSelector {
    provider: Provider,
}

impl ProviderSelector {
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }

    /// Build the provider named by `config.provider`. Credentials of the other
    /// providers are dropped unused.
    pub fn from_config(config: GatewayConfig) -> AdapterResult<Self> {
        let provider = match config.provider {
            ProviderKind::Meta => {
                info!("Using Meta Cloud API directly");
                Provider::Meta(Arc::new(MetaProvider::new(config.meta)))
            }
            ProviderKind::Twilio => {
                info!("Using Twilio as WhatsApp relay");
                Provider::Twilio(Arc::new(TwilioProvider::new(config.twilio)))
            }
            ProviderKind::Evolution => {
                info!("Using Evolution API as WhatsApp relay");
                Provider::Evolution(Arc::new(EvolutionProvider::new(config.evolution)?))
            }
        };

        Ok(Self::new(provider))
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    /// Replace the active provider (tests, alternative backends)
    pub fn set_provider(&mut self, provider: Provider) {
        self.provider = provider;
    }

    pub fn into_provider(self) -> Provider {
        self.provider
    }
}
