//! Configuration file parser for ~/.config/feedsync/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::cache::FeedCache;
use crate::feed::{CachedFeedLoader, FeedError, FeedFetcher, FetcherSettings, DEFAULT_USER_AGENT};
use crate::server::{RelayCachePolicy, ServerState};
use crate::session::SyncSettings;
use crate::util::HostPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Articles per page for first load and "load more".
    pub page_size: usize,

    /// Articles fetched by each poll tick.
    pub poll_page_size: usize,

    pub poll_interval_secs: u64,

    pub backfill_interval_secs: u64,

    /// Lifetime of parsed pages in the in-process cache.
    pub page_cache_ttl_secs: u64,

    /// `s-maxage` advertised on relayed responses.
    pub relay_server_ttl_secs: u64,

    /// `max-age` advertised on relayed responses.
    pub relay_browser_ttl_secs: u64,

    /// Maximum number of cached pages.
    pub cache_capacity: usize,

    /// Forwarding relay for origins that block direct requests.
    pub relay_url: Option<String>,

    /// Permit loopback and private-network feed hosts. Off by default so
    /// the relay cannot be pointed at internal services.
    pub allow_private_hosts: bool,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            page_size: 25,
            poll_page_size: 5,
            poll_interval_secs: 60,
            backfill_interval_secs: 300,
            page_cache_ttl_secs: 30,
            relay_server_ttl_secs: 600,
            relay_browser_ttl_secs: 120,
            cache_capacity: crate::cache::DEFAULT_CAPACITY,
            relay_url: None,
            allow_private_hosts: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "listen_addr",
    "page_size",
    "poll_page_size",
    "poll_interval_secs",
    "backfill_interval_secs",
    "page_cache_ttl_secs",
    "relay_server_ttl_secs",
    "relay_browser_ttl_secs",
    "cache_capacity",
    "relay_url",
    "allow_private_hosts",
    "user_agent",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parses and validates TOML text. Blank input yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        tracing::info!(
            listen_addr = %config.listen_addr,
            relayed = config.relay_url.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("page_size", self.page_size as u64),
            ("poll_page_size", self.poll_page_size as u64),
            ("poll_interval_secs", self.poll_interval_secs),
            ("backfill_interval_secs", self.backfill_interval_secs),
            ("cache_capacity", self.cache_capacity as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        self.relay()?;
        Ok(())
    }

    /// The parsed relay URL, if configured.
    pub fn relay(&self) -> Result<Option<Url>, ConfigError> {
        self.relay_url
            .as_deref()
            .map(|raw| {
                let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
                    key: "relay_url",
                    reason: e.to_string(),
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::Invalid {
                        key: "relay_url",
                        reason: format!("unsupported scheme {}", url.scheme()),
                    });
                }
                Ok(url)
            })
            .transpose()
    }

    pub fn host_policy(&self) -> HostPolicy {
        if self.allow_private_hosts {
            HostPolicy::AllowPrivate
        } else {
            HostPolicy::PublicOnly
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            page_size: self.page_size,
            poll_page_size: self.poll_page_size,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            backfill_interval: Duration::from_secs(self.backfill_interval_secs),
        }
    }

    /// Fetcher for sessions; goes through the relay when one is configured.
    pub fn session_fetcher(&self) -> Result<FeedFetcher, FeedError> {
        let relay_url = self.relay().map_err(|e| FeedError::InvalidUrl(e.to_string()))?;
        FeedFetcher::new(FetcherSettings {
            user_agent: self.user_agent.clone(),
            relay_url,
            host_policy: self.host_policy(),
        })
    }

    /// Fetcher that always contacts origins directly.
    pub fn direct_fetcher(&self) -> Result<FeedFetcher, FeedError> {
        FeedFetcher::new(FetcherSettings {
            user_agent: self.user_agent.clone(),
            relay_url: None,
            host_policy: self.host_policy(),
        })
    }

    pub fn loader(&self, fetcher: FeedFetcher) -> CachedFeedLoader {
        CachedFeedLoader::new(
            fetcher,
            Arc::new(FeedCache::new(self.cache_capacity)),
            Duration::from_secs(self.page_cache_ttl_secs),
        )
    }

    /// Shared state for the HTTP server. The relay endpoint is itself a
    /// relay, so both handlers fetch directly.
    pub fn server_state(&self) -> Result<ServerState, FeedError> {
        let fetcher = self.direct_fetcher()?;
        Ok(ServerState {
            loader: self.loader(fetcher.clone()),
            fetcher,
            relay_cache: RelayCachePolicy {
                server_ttl: Duration::from_secs(self.relay_server_ttl_secs),
                browser_ttl: Duration::from_secs(self.relay_browser_ttl_secs),
            },
            default_page_size: self.page_size,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
