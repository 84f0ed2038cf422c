//! WhatsApp Gateway
//!
//! Sends and receives WhatsApp messages through one of three backends:
//! - Meta Cloud API, called directly
//! - Twilio, as a relay
//! - Evolution API, as a relay
//!
//! Inbound webhooks from every backend are normalized into [`model::Message`].
//! A chat-whatsapp relay session (QR pairing, status, message history) is
//! reachable alongside the active backend through [`chat_relay`].

pub mod api;
pub mod chat_relay;
pub mod config;
pub mod model;
pub mod normalize;
pub mod payload;
pub mod providers;
pub mod repository;
pub mod selector;
pub mod service;
pub mod usecases;

pub use api::{create_router, AppState};
pub use chat_relay::ChatRelayClient;
pub use config::GatewayConfig;
pub use model::{
    Message, MessageDirection, MessageStatus, MessageType, SendMessageParams,
    WhatsAppMessageResponse,
};
pub use providers::{AdapterError, AdapterResult, ProviderKind, WhatsAppProvider};
pub use repository::{InMemoryMessageRepository, MessageRepository};
pub use selector::{Provider, ProviderSelector};
pub use service::WhatsAppGatewayService;
