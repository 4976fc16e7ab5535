//! Environment-driven configuration shared by the server binary.
//!
//! Each module loads its own settings (`GeoConfig`, `ReporterConfig`,
//! `SessionConfig`, `TelegramConfig`); the helpers here keep the parsing
//! rules identical everywhere: values are trimmed and empty means unset.

use std::net::SocketAddr;
use std::str::FromStr;

/// Read an env var, trimmed, treating empty as unset
pub(crate) fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Parse an env var, ignoring values that don't parse
pub(crate) fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_trimmed(name).and_then(|value| value.parse().ok())
}

/// Boolean switch: anything except "0" or "false" counts as enabled
pub(crate) fn env_flag(name: &str, default: bool) -> bool {
    env_trimmed(name)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory served as the page (index.html, bg-img.jpg, audio.mp3)
    pub static_dir: String,
    /// Take the visitor IP from X-Forwarded-For / X-Real-IP (only behind a proxy)
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            static_dir: "static".to_string(),
            trust_forwarded_for: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match env_trimmed("BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid BIND_ADDR {:?}: {}", raw, e);
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        Self {
            bind_addr,
            static_dir: env_trimmed("STATIC_DIR").unwrap_or(defaults.static_dir),
            trust_forwarded_for: env_flag("TRUST_FORWARDED_FOR", false),
        }
    }

    /// URL of this server's own relay endpoint, reachable from the server itself
    pub fn local_notify_url(&self) -> String {
        format!("http://127.0.0.1:{}/api/notify", self.bind_addr.port())
    }
}
