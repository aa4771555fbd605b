use std::env;
use std::fmt;

use crate::utils::error::ConfigError;

/// Port on which relays expect TLS from the first byte (SMTPS)
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Relay settings and sender credentials, fixed for the lifetime of an `EmailService`.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub sender_address: String,
    pub relay_host: String,
    pub relay_port: u16,
    pub auth_username: String,
    pub auth_secret: String,
}

impl RelayConfig {
    pub fn new(
        sender_address: impl Into<String>,
        relay_host: impl Into<String>,
        relay_port: u16,
        auth_username: impl Into<String>,
        auth_secret: impl Into<String>,
    ) -> Self {
        Self {
            sender_address: sender_address.into(),
            relay_host: relay_host.into(),
            relay_port,
            auth_username: auth_username.into(),
            auth_secret: auth_secret.into(),
        }
    }

    /// Load relay configuration from environment variables
    ///
    /// Required: `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM_EMAIL`.
    /// Optional: `SMTP_PORT` (default: 465).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let relay_port = match lookup("SMTP_PORT").filter(|value| !value.is_empty()) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => IMPLICIT_TLS_PORT,
        };

        Ok(Self {
            sender_address: required("SMTP_FROM_EMAIL")?,
            relay_host: required("SMTP_HOST")?,
            relay_port,
            auth_username: required("SMTP_USERNAME")?,
            auth_secret: required("SMTP_PASSWORD")?,
        })
    }

    /// `host:port` of the relay
    pub fn relay_addr(&self) -> String {
        format!("{}:{}", self.relay_host, self.relay_port)
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("sender_address", &self.sender_address)
            .field("relay_host", &self.relay_host)
            .field("relay_port", &self.relay_port)
            .field("auth_username", &self.auth_username)
            .field("auth_secret", &"<redacted>")
            .finish()
    }
}
