//! Daemon configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use virtd_common::types::AuthType;

use crate::sasl::StaticSaslConfig;

/// Top-level daemon configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address for read-write client connections
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Optional address for read-only client connections; sessions
    /// arriving here have their connections forced read-only
    #[serde(default)]
    pub readonly_listen_addr: Option<SocketAddr>,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:16509".parse().expect("static default address")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            readonly_listen_addr: None,
            auth: AuthConfig::default(),
        }
    }
}

/// Authentication scheme required from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMechanism {
    /// Accept every client without authentication.
    #[default]
    None,
    /// Require a SASL negotiation before any other procedure.
    Sasl,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mechanism: AuthMechanism,

    /// Offer the ANONYMOUS mechanism (any client authenticates at once)
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,

    /// PLAIN credentials: username = "password"
    #[serde(default)]
    pub users: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mechanism: AuthMechanism::None,
            allow_anonymous: true,
            users: HashMap::new(),
        }
    }
}

impl DaemonConfig {
    /// Loads the configuration file, or the defaults when no path was
    /// given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        Ok(config)
    }

    /// The auth scheme advertised to (and required from) new sessions.
    pub fn auth_type(&self) -> AuthType {
        match self.auth.mechanism {
            AuthMechanism::None => AuthType::None,
            AuthMechanism::Sasl => AuthType::Sasl,
        }
    }

    /// Settings for the built-in SASL backend.
    pub fn sasl_config(&self) -> StaticSaslConfig {
        StaticSaslConfig {
            allow_anonymous: self.auth.allow_anonymous,
            users: self.auth.users.clone(),
        }
    }

    /// A commented sample configuration for `virtd generate-config`.
    pub fn generate_sample() -> String {
        concat!(
            "# virtd daemon configuration\n",
            "\n",
            "# Read-write client connections\n",
            "listen_addr = \"127.0.0.1:16509\"\n",
            "\n",
            "# Uncomment to also accept read-only clients\n",
            "# readonly_listen_addr = \"127.0.0.1:16510\"\n",
            "\n",
            "[auth]\n",
            "# \"none\" accepts every client; \"sasl\" requires a negotiation\n",
            "mechanism = \"none\"\n",
            "# With mechanism = \"sasl\":\n",
            "# allow_anonymous = false\n",
            "# [auth.users]\n",
            "# admin = \"change-me\"\n",
        )
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_accept_everyone() {
        let config = DaemonConfig::default();
        assert_eq!(config.auth_type(), AuthType::None);
        assert!(config.readonly_listen_addr.is_none());
    }

    #[test]
    fn sample_config_parses_back() {
        let config: DaemonConfig = toml::from_str(&DaemonConfig::generate_sample()).unwrap();
        assert_eq!(config.listen_addr, default_listen_addr());
    }

    #[test]
    fn sasl_section_parses() {
        let config: DaemonConfig = toml::from_str(
            r#"
            listen_addr = "0.0.0.0:16509"
            readonly_listen_addr = "0.0.0.0:16510"

            [auth]
            mechanism = "sasl"
            allow_anonymous = false

            [auth.users]
            admin = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.auth_type(), AuthType::Sasl);
        let sasl = config.sasl_config();
        assert!(!sasl.allow_anonymous);
        assert_eq!(sasl.users.get("admin").map(String::as_str), Some("secret"));
    }
}
