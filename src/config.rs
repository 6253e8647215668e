//! Client configuration
//!
//! The endpoint is chosen by deploy mode unless an explicit override is
//! given. Environment variables can overlay any file- or code-provided
//! configuration.

use crate::backoff::ReconnectPolicy;
use crate::error::{ClientError, Result};
use crate::types::Network;
use serde::{Deserialize, Serialize};

/// Endpoint used in development builds
pub const DEVELOPMENT_ENDPOINT: &str = "ws://localhost:8080";

/// Endpoint used in production deployments
pub const PRODUCTION_ENDPOINT: &str = "wss://agent.hedron.app/ws";

/// Text the backend includes in the notice that acknowledges auth
pub const DEFAULT_AUTH_MARKER: &str = "Authenticated successfully";

/// Build/deploy mode selecting a preconfigured endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for DeployMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ClientError::Config(format!("unknown deploy mode '{}'", other))),
        }
    }
}

/// Session client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default)]
    pub mode: DeployMode,

    /// Explicit endpoint, overriding the mode's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Network used to resolve token ids in extracted quotes
    #[serde(default)]
    pub network: Network,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Success marker looked for in system notices
    #[serde(default = "default_auth_marker")]
    pub auth_marker: String,

    /// Capacity of the presentation command queue
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_auth_marker() -> String {
    DEFAULT_AUTH_MARKER.to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            mode: DeployMode::default(),
            endpoint: None,
            network: Network::default(),
            reconnect: ReconnectPolicy::default(),
            auth_marker: default_auth_marker(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ClientConfig {
    /// Default configuration with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay `HEDRON_MODE`, `HEDRON_ENDPOINT` and `HEDRON_NETWORK`
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(mode) = lookup("HEDRON_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(endpoint) = lookup("HEDRON_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = Some(endpoint.trim().to_string());
            }
        }
        if let Some(network) = lookup("HEDRON_NETWORK") {
            self.network = network.parse().map_err(ClientError::Config)?;
        }
        self.validate()
    }

    /// Resolved endpoint: explicit override first, then the mode default
    pub fn endpoint(&self) -> &str {
        match &self.endpoint {
            Some(endpoint) => endpoint,
            None => match self.mode {
                DeployMode::Development => DEVELOPMENT_ENDPOINT,
                DeployMode::Production => PRODUCTION_ENDPOINT,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint();
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ClientError::Config(format!(
                "endpoint must use ws:// or wss://, got '{}'",
                endpoint
            )));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(ClientError::Config(
                "reconnect base delay must be greater than zero".to_string(),
            ));
        }
        if self.auth_marker.trim().is_empty() {
            return Err(ClientError::Config("auth marker must not be empty".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(ClientError::Config("event capacity must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.mode, DeployMode::Development);
        assert_eq!(config.endpoint(), DEVELOPMENT_ENDPOINT);
        assert_eq!(config.auth_marker, "Authenticated successfully");
        assert_eq!(config.reconnect.base_delay_ms, 3_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_selects_endpoint() {
        let config = ClientConfig {
            mode: DeployMode::Production,
            ..Default::default()
        };
        assert_eq!(config.endpoint(), PRODUCTION_ENDPOINT);
    }

    #[test]
    fn test_explicit_endpoint_overrides_mode() {
        let config = ClientConfig {
            mode: DeployMode::Production,
            endpoint: Some("ws://10.0.0.5:9000".to_string()),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), "ws://10.0.0.5:9000");
    }

    #[test]
    fn test_env_overlay() {
        let mut config = ClientConfig::default();
        config
            .apply_env_from(lookup(&[
                ("HEDRON_MODE", "prod"),
                ("HEDRON_NETWORK", "testnet"),
            ]))
            .unwrap();
        assert_eq!(config.mode, DeployMode::Production);
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.endpoint(), PRODUCTION_ENDPOINT);

        config
            .apply_env_from(lookup(&[("HEDRON_ENDPOINT", "wss://staging.example/ws")]))
            .unwrap();
        assert_eq!(config.endpoint(), "wss://staging.example/ws");
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = ClientConfig::default();
        assert!(config.apply_env_from(lookup(&[("HEDRON_MODE", "staging")])).is_err());

        let mut config = ClientConfig::default();
        let err = config
            .apply_env_from(lookup(&[("HEDRON_ENDPOINT", "http://localhost:8080")]))
            .unwrap_err();
        assert!(err.to_string().contains("ws:// or wss://"));
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let mut config = ClientConfig::default();
        config.reconnect.base_delay_ms = 0;
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"mode":"production","network":"testnet"}"#).unwrap();
        assert_eq!(config.mode, DeployMode::Production);
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.auth_marker, DEFAULT_AUTH_MARKER);
        assert_eq!(config.event_capacity, 256);
    }
}
