//! Feed configuration.
//!
//! A feed is described by one JSON file:
//!
//! ```json
//! {
//!   "alias": "clinic-a",
//!   "verbose": false,
//!   "chunk_max_items": 40,
//!   "feed": { "base_url": "https://clinic-a.example/api", "timeout_ms": 20000 },
//!   "hub":  { "base_url": "https://hub.example", "max_attempts": 4 }
//! }
//! ```
//!
//! # Environment Variables
//!
//! Bearer tokens may come from the environment when an endpoint section
//! configures no `auth`:
//!
//! | Endpoint | Primary Env Var | Fallback Env Var |
//! |----------|-----------------|------------------|
//! | Feed | `FEEDHUB_<ALIAS>_FEED_TOKEN` | `FEEDHUB_FEED_TOKEN` |
//! | Hub | `FEEDHUB_<ALIAS>_HUB_TOKEN` | `FEEDHUB_HUB_TOKEN` |
//!
//! `<ALIAS>` is the alias upper-cased with every non-alphanumeric character
//! replaced by `_`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::{Endpoint, RequestOptions};
use crate::feed::Feed;
use crate::http_client::{HttpAuth, HttpClient};
use crate::retry::{AttemptPolicy, Backoff};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// One endpoint section of a feed config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default)]
    pub auth: HttpAuth,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

impl EndpointConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
            auth: HttpAuth::None,
        }
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                format!("{section}.base_url"),
                format!("'{}' must be an absolute http(s) URL", self.base_url),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid(
                format!("{section}.timeout_ms"),
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    fn options(&self, verbose: bool) -> RequestOptions {
        RequestOptions::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_attempts(AttemptPolicy {
                max_attempts: self.max_attempts,
                backoff: self.backoff,
                retry_on_socket: true,
            })
            .with_verbose(verbose)
    }
}

/// A whole feed config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub alias: String,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub chunk_max_items: Option<usize>,
    pub feed: EndpointConfig,
    pub hub: EndpointConfig,
}

impl FeedConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alias.trim().is_empty() {
            return Err(ConfigError::invalid("alias", "must not be empty"));
        }
        if self.chunk_max_items == Some(0) {
            return Err(ConfigError::invalid("chunk_max_items", "must be greater than zero"));
        }
        self.feed.validate("feed")?;
        self.hub.validate("hub")
    }

    /// Builds the feed, reading tokens from the process environment.
    pub fn build(&self, client: Arc<dyn HttpClient>) -> Result<Arc<Feed>, ConfigError> {
        self.build_with_env(client, |name| std::env::var(name).ok())
    }

    /// Builds the feed, reading tokens through `env`.
    pub fn build_with_env(
        &self,
        client: Arc<dyn HttpClient>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Arc<Feed>, ConfigError> {
        self.validate()?;

        let feed_auth = self.resolve_auth(&self.feed, "FEED", &env);
        let hub_auth = self.resolve_auth(&self.hub, "HUB", &env);

        let feed_endpoint = Endpoint::new(format!("{}/feed", self.alias), &self.feed.base_url, Arc::clone(&client))
            .with_auth(feed_auth)
            .with_defaults(self.feed.options(self.verbose));
        let hub_endpoint = Endpoint::new(format!("{}/hub", self.alias), &self.hub.base_url, client)
            .with_auth(hub_auth)
            .with_defaults(self.hub.options(self.verbose));

        let mut feed = Feed::new(&self.alias, feed_endpoint, hub_endpoint).with_verbose(self.verbose);
        if let Some(chunk_max_items) = self.chunk_max_items {
            feed = feed.with_chunk_max_items(chunk_max_items);
        }

        tracing::info!(
            feed = %self.alias,
            feed_url = %self.feed.base_url,
            hub_url = %self.hub.base_url,
            "feed configured"
        );
        Ok(Arc::new(feed))
    }

    fn resolve_auth(&self, section: &EndpointConfig, side: &str, env: &impl Fn(&str) -> Option<String>) -> HttpAuth {
        if section.auth != HttpAuth::None {
            return section.auth.clone();
        }
        let specific = format!("FEEDHUB_{}_{side}_TOKEN", env_alias(&self.alias));
        let shared = format!("FEEDHUB_{side}_TOKEN");

        env(&specific)
            .or_else(|| env(&shared))
            .filter(|token| !token.trim().is_empty())
            .map_or(HttpAuth::None, |token| HttpAuth::BearerToken { token })
    }
}

fn env_alias(alias: &str) -> String {
    alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
