use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use anyhow::bail;

/// Loopback address used when `LLM_API_URL` is unset outside production.
pub const DEV_UPSTREAM_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub upstream_base_url: String,
    pub environment: Environment,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests never touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("SERVER_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".into())
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));

        let environment = lookup("APP_ENV")
            .map(|raw| Environment::parse(&raw))
            .unwrap_or(Environment::Development);

        let upstream_base_url = match lookup("LLM_API_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => normalize_base_url(&url),
            None if environment == Environment::Production => {
                bail!("LLM_API_URL must be set when APP_ENV=production")
            }
            None => {
                tracing::warn!(
                    default = DEV_UPSTREAM_URL,
                    "LLM_API_URL not set, using development upstream"
                );
                DEV_UPSTREAM_URL.to_string()
            }
        };

        Ok(Self {
            listen_addr,
            upstream_base_url,
            environment,
        })
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
