//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MULTI_URI_MAX;
use crate::registry::DEFAULT_PAGE_SIZE;

/// Root configuration for the protocol server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Protocol settings (root path, limits, CORS).
    pub protocol: ProtocolConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Static credentials.
    pub auth: AuthConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// URI prefix of the API, starting and ending with `/`.
    pub root_path: String,

    /// `api-version` reported by the root namespace.
    pub root_version: String,

    /// Maximum number of ids in one URI.
    pub multi_uri_max: usize,

    /// LIST page size when the client sends no `COUNT`.
    pub default_page_size: usize,

    /// Expose internal error messages to clients.
    pub debug: bool,

    /// Origins sent in CORS headers. Empty disables CORS.
    pub cors_allow_list: Vec<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            root_path: "/api/".to_string(),
            root_version: "0.0".to_string(),
            multi_uri_max: DEFAULT_MULTI_URI_MAX,
            default_page_size: DEFAULT_PAGE_SIZE,
            debug: false,
            cors_allow_list: Vec::new(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "cinp_server=debug,tower_http=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Static credential table.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub users: Vec<UserConfig>,
}

/// One configured user.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub id: String,
    pub token: String,

    /// Bypass every auth predicate.
    #[serde(default)]
    pub superuser: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.protocol.root_path, "/api/");
        assert_eq!(config.protocol.multi_uri_max, 100);
        assert!(config.auth.users.is_empty());
    }

    #[test]
    fn parses_users_and_protocol() {
        let config: ServerConfig = toml::from_str(
            r#"
            [protocol]
            root_path = "/v1/"
            cors_allow_list = ["https://ui.example"]

            [[auth.users]]
            id = "root"
            token = "s3cret"
            superuser = true

            [[auth.users]]
            id = "reader"
            token = "r3ad"
            "#,
        )
        .unwrap();

        assert_eq!(config.protocol.root_path, "/v1/");
        assert_eq!(config.protocol.root_version, "0.0");
        assert_eq!(config.auth.users.len(), 2);
        assert!(config.auth.users[0].superuser);
        assert!(!config.auth.users[1].superuser);
    }
}
