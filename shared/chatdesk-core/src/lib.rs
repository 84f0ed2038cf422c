//! Chatdesk Core - Shared service infrastructure
//!
//! This crate provides:
//! - Standard service trait all chatdesk services implement
//! - Error handling utilities with HTTP status mapping
//! - Configuration management

pub mod config;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use error::{ChatdeskError, Result};
pub use service::{
    ChatdeskService, DependencyStatus, HealthStatus, MicroserviceRuntime, ReadinessStatus,
};
