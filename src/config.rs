//! Runtime configuration, read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `GRIEVANCE_PORT` | `3000` |
//! | `GRIEVANCE_API_URL` | `https://localhost:7001/api` |
//! | `GRIEVANCE_HUB_URL` | `https://localhost:7001/notificationHub` |
//! | `GRIEVANCE_HUB_TOKEN` | unset |
//! | `GRIEVANCE_PUSH_ENABLED` | `true` |
//! | `GRIEVANCE_HUB_SKIP_NEGOTIATION` | `false` |
//! | `GEMINI_API_KEY` | empty |
//! | `GEMINI_MODEL` | `gemini-2.5-flash-preview-09-2025` |
//! | `GEMINI_API_URL` | `https://generativelanguage.googleapis.com/v1beta` |
//!
//! Unparseable values fall back to the default.

use std::env;

use crate::data_sources::complaints::COMPLAINTS_API_BASE;
use crate::data_sources::generative::{DEFAULT_MODEL, GENERATIVE_API_BASE};

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default notification hub.
pub const DEFAULT_HUB_URL: &str = "https://localhost:7001/notificationHub";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub api_url: String,
    pub hub_url: String,
    pub hub_token: Option<String>,
    pub push_enabled: bool,
    /// Open the hub websocket directly, for hubs that accept connections
    /// without a negotiate round trip.
    pub hub_skip_negotiation: bool,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_api_url: String,
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            port: lookup("GRIEVANCE_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(DEFAULT_PORT),
            api_url: text("GRIEVANCE_API_URL", COMPLAINTS_API_BASE),
            hub_url: text("GRIEVANCE_HUB_URL", DEFAULT_HUB_URL),
            hub_token: lookup("GRIEVANCE_HUB_TOKEN").filter(|v| !v.trim().is_empty()),
            push_enabled: lookup("GRIEVANCE_PUSH_ENABLED")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
            hub_skip_negotiation: lookup("GRIEVANCE_HUB_SKIP_NEGOTIATION")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            gemini_api_key: lookup("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: text("GEMINI_MODEL", DEFAULT_MODEL),
            gemini_api_url: text("GEMINI_API_URL", GENERATIVE_API_BASE),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.api_url, COMPLAINTS_API_BASE);
        assert_eq!(config.hub_url, DEFAULT_HUB_URL);
        assert_eq!(config.hub_token, None);
        assert!(config.push_enabled);
        assert!(!config.hub_skip_negotiation);
        assert_eq!(config.gemini_api_key, "");
        assert_eq!(config.gemini_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("GRIEVANCE_PORT", "8080"),
            ("GRIEVANCE_API_URL", "http://backend:5000/api"),
            ("GRIEVANCE_HUB_TOKEN", "secret"),
            ("GRIEVANCE_PUSH_ENABLED", "off"),
            ("GRIEVANCE_HUB_SKIP_NEGOTIATION", "yes"),
            ("GEMINI_API_KEY", "key"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.api_url, "http://backend:5000/api");
        assert_eq!(config.hub_token.as_deref(), Some("secret"));
        assert!(!config.push_enabled);
        assert!(config.hub_skip_negotiation);
        assert_eq!(config.gemini_api_key, "key");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("GRIEVANCE_PORT", "eighty"),
            ("GRIEVANCE_PUSH_ENABLED", "maybe"),
            ("GRIEVANCE_HUB_URL", "  "),
        ]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.push_enabled);
        assert_eq!(config.hub_url, DEFAULT_HUB_URL);
    }
}
