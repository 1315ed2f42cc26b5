use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

/// Placeholder secrets that sign sessions anyone can forge.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "it's a secret"];

pub struct Config {
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub secret_key: String,
    pub session_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let db_path: PathBuf = get("WARBLER_DB_PATH").unwrap_or_else(|| "warbler.db".into()).into();
        let host = get("WARBLER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("WARBLER_PORT")
            .unwrap_or_else(|| "5000".into())
            .parse()
            .context("WARBLER_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

        let secret_key = get("WARBLER_SECRET_KEY").unwrap_or_default();
        let secret_key = if secret_key.is_empty() {
            warn!("WARBLER_SECRET_KEY is unset, using the development key");
            "dev-secret-change-me".to_string()
        } else {
            if PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
                warn!("WARBLER_SECRET_KEY is still a placeholder; sessions can be forged");
            }
            secret_key
        };

        let session_days: i64 = get("WARBLER_SESSION_DAYS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            db_path,
            addr,
            secret_key,
            session_ttl: chrono::Duration::days(session_days),
        })
    }
}
