//! Configuration management for services

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `whatsapp_gateway=debug,info`
    pub log_level: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "whatsapp-gateway".to_string()),
            log_level: lookup("LOG_LEVEL")
                .map(|level| level.trim().to_string())
                .filter(|level| !level.is_empty())
                .unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Directive for the log filter
    pub fn log_directive(&self) -> &str {
        &self.log_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(|_| None);
        assert_eq!(config.service_name, "whatsapp-gateway");
        assert_eq!(config.log_directive(), "info");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SERVICE_NAME", "gateway-br"),
            ("LOG_LEVEL", " whatsapp_gateway=trace,warn "),
        ]
        .into_iter()
        .collect();
        let config = ServiceConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.service_name, "gateway-br");
        assert_eq!(config.log_directive(), "whatsapp_gateway=trace,warn");
    }

    #[test]
    fn test_blank_log_level_falls_back() {
        let config = ServiceConfig::from_lookup(|k| (k == "LOG_LEVEL").then(|| "  ".to_string()));
        assert_eq!(config.log_directive(), "info");
    }
}
