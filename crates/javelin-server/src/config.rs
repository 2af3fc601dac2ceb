//! Server configuration.

use std::fmt;

use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret the proxy signs forwarded identities with.
    pub forwarding_secret: String,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Seconds an accepted connection may take to finish logging in.
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u32,
}

fn default_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    25565
}

fn default_backlog() -> i32 {
    16
}

fn default_login_timeout() -> u32 {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            forwarding_secret: String::new(),
            backlog: default_backlog(),
            login_timeout_secs: default_login_timeout(),
        }
    }
}

// The secret must never reach logs, so Debug redacts it.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("forwarding_secret", &"<redacted>")
            .field("backlog", &self.backlog)
            .field("login_timeout_secs", &self.login_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_shows_secret() {
        let config = ServerConfig {
            forwarding_secret: "hunter2".into(),
            ..ServerConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 25565);
        assert_eq!(config.backlog, 16);
        assert_eq!(config.login_timeout_secs, 2);
    }
}
