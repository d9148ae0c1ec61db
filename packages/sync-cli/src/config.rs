use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use graph_sync::{RetryConfig, SyncConfig};

/// Which graph backend to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSpec {
    Memory,
    Sqlite(String),
    Neo4j,
}

impl StoreSpec {
    /// `memory`, `sqlite:<url>` or `neo4j`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw {
            "memory" => Ok(Self::Memory),
            "neo4j" => Ok(Self::Neo4j),
            "sqlite" => Ok(Self::Sqlite("sqlite://graph.db?mode=rwc".to_string())),
            _ => match raw.strip_prefix("sqlite:") {
                // Accept both `sqlite:graph.db` and a full `sqlite://...` URL.
                Some(rest) if rest.starts_with("//") || rest.starts_with(":memory:") => {
                    Ok(Self::Sqlite(raw.to_string()))
                }
                Some(path) if !path.is_empty() => {
                    Ok(Self::Sqlite(format!("sqlite://{path}?mode=rwc")))
                }
                _ => bail!("unknown store {raw:?} (expected memory, sqlite:<url> or neo4j)"),
            },
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreSpec,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: Option<String>,
    pub concurrency: usize,
    pub store_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            store: StoreSpec::parse(
                &env::var("GRAPH_STORE").unwrap_or_else(|_| "memory".to_string()),
            )
            .context("GRAPH_STORE is invalid")?,
            neo4j_uri: env::var("NEO4J_URI")
                .unwrap_or_else(|_| "127.0.0.1:7687".to_string()),
            neo4j_user: env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
            neo4j_password: env::var("NEO4J_PASSWORD").ok(),
            concurrency: env::var("SYNC_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .context("SYNC_CONCURRENCY must be a valid number")?,
            store_timeout_secs: env::var("STORE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("STORE_TIMEOUT_SECS must be a valid number")?,
            retry_attempts: env::var("RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("RETRY_ATTEMPTS must be a valid number")?,
            retry_base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .context("RETRY_BASE_DELAY_MS must be a valid number")?,
        })
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new()
            .with_concurrency(self.concurrency)
            .with_store_timeout(Duration::from_secs(self.store_timeout_secs))
            .with_retry(
                RetryConfig::new(self.retry_attempts)
                    .with_base_delay(Duration::from_millis(self.retry_base_delay_ms)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_spec_parse() {
        assert_eq!(StoreSpec::parse("memory").unwrap(), StoreSpec::Memory);
        assert_eq!(StoreSpec::parse(" neo4j ").unwrap(), StoreSpec::Neo4j);
        assert_eq!(
            StoreSpec::parse("sqlite:graph.db").unwrap(),
            StoreSpec::Sqlite("sqlite://graph.db?mode=rwc".to_string())
        );
        assert_eq!(
            StoreSpec::parse("sqlite::memory:").unwrap(),
            StoreSpec::Sqlite("sqlite::memory:".to_string())
        );
        assert!(StoreSpec::parse("postgres://x").is_err());
        assert!(StoreSpec::parse("sqlite:").is_err());
    }
}
