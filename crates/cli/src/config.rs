//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Accounts to monitor (usernames)
    #[serde(default)]
    pub accounts: Vec<String>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Admission window: posts older than this at fetch time are skipped
    #[serde(default = "default_freshness_window")]
    pub freshness_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,

    #[serde(default = "default_bearer_token_env")]
    pub bearer_token_env: String,
}

/// Closed set of sink backends, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SinkBackend {
    #[default]
    Sqlite,
    Files,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: SinkBackend,

    /// Database path (sqlite backend)
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Record directory root (files backend)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for per-account state files written on shutdown
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

// Default value functions
fn default_poll_interval() -> u64 {
    15
}

fn default_freshness_window() -> u64 {
    300
}

fn default_feed_base_url() -> String {
    "https://api.twitter.com".to_string()
}

fn default_bearer_token_env() -> String {
    "FEED_BEARER_TOKEN".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./archive.sqlite")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./saved_posts")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            accounts: vec![],
            poll_interval_secs: default_poll_interval(),
            freshness_window_secs: default_freshness_window(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            bearer_token_env: default_bearer_token_env(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: SinkBackend::default(),
            db_path: default_db_path(),
            output_dir: default_output_dir(),
            state_dir: default_state_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("POST_ARCHIVER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# post-archiver configuration

[watch]
accounts = ["example_account_1", "example_account_2"]
poll_interval_secs = 15
# Posts older than this at fetch time are not archived
freshness_window_secs = 300

[feed]
base_url = "https://api.twitter.com"
bearer_token_env = "FEED_BEARER_TOKEN"

[storage]
backend = "sqlite"  # sqlite, files
db_path = "./archive.sqlite"
output_dir = "./saved_posts"
state_dir = "./state"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_toml_parses_into_config() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).expect("valid toml");
        assert_eq!(config.watch.poll_interval_secs, 15);
        assert_eq!(config.storage.backend, SinkBackend::Sqlite);
        assert_eq!(config.watch.accounts.len(), 2);
    }

    #[test]
    fn backend_tag_deserializes_closed_set() {
        let config: AppConfig =
            toml::from_str("[storage]\nbackend = \"files\"\n").expect("valid toml");
        assert_eq!(config.storage.backend, SinkBackend::Files);

        let invalid = toml::from_str::<AppConfig>("[storage]\nbackend = \"mongodb\"\n");
        assert!(invalid.is_err());
    }
}
