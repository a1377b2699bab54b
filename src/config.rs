use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_COLLECTION: &str = "companies";
const DEFAULT_POLL_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub project: Option<String>,
    pub api_key: Option<String>,
    pub collection: String,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend: Backend,
    pub db_path: Option<PathBuf>,
    pub remote: RemoteConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match var("SHORTLIST_BACKEND") {
            Some(raw) => Backend::from_str(raw.trim(), true)
                .map_err(|_| anyhow!("SHORTLIST_BACKEND must be 'local' or 'remote', got '{}'", raw))?,
            None => Backend::default(),
        };

        let poll_ms = match var("SHORTLIST_POLL_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("SHORTLIST_POLL_MS must be a number of milliseconds, got '{}'", raw))?,
            None => DEFAULT_POLL_MS,
        };
        if poll_ms == 0 {
            return Err(anyhow!("SHORTLIST_POLL_MS must be greater than zero"));
        }

        let config = Self {
            backend,
            db_path: var("SHORTLIST_DB").map(PathBuf::from),
            remote: RemoteConfig {
                base_url: var("SHORTLIST_REMOTE_BASE_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                project: var("SHORTLIST_REMOTE_PROJECT"),
                api_key: var("SHORTLIST_REMOTE_API_KEY"),
                collection: var("SHORTLIST_REMOTE_COLLECTION")
                    .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
                poll_interval: Duration::from_millis(poll_ms),
            },
        };
        debug!(backend = ?config.backend, "loaded configuration");
        Ok(config)
    }
}
