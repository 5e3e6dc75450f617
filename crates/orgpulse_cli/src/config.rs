//! Configuration file support for orgpulse.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `ORGPULSE_`, sections separated by
//!    a double underscore, e.g. `ORGPULSE_GITHUB__TOKEN`, `ORGPULSE_SYNC__BATCH_SIZE`)
//! 3. Config file (~/.config/orgpulse/config.toml or ./orgpulse.toml)
//! 4. Built-in defaults
//!
//! A plain `GITHUB_TOKEN` is used when no token is configured.
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."                      # or ORGPULSE_GITHUB__TOKEN / GITHUB_TOKEN
//! api_url = "https://api.github.com"     # GitHub Enterprise: https://host/api/v3
//! requests_per_second = 10
//!
//! [cache]
//! path = "~/.local/state/orgpulse/cache.json"   # optional, this is the default
//! max_bytes = 5242880
//! flush_interval_secs = 30
//!
//! [cache.ttl]
//! repositories_secs = 3600
//! branches_secs = 3600
//! commits_secs = 86400
//! employees_secs = 86400
//!
//! [sync]
//! batch_size = 5
//! batch_delay_ms = 1000
//! lookback_days = 30
//! members_only = false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use orgpulse::cache::{CacheConfig, CacheTtls, DEFAULT_MAX_BYTES};
use orgpulse::github::DEFAULT_API_URL;
use orgpulse::rate_limits;
use orgpulse::sync::{DEFAULT_BATCH_SIZE, DEFAULT_LOOKBACK_DAYS, SyncOptions};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub cache: CacheSection,
    /// Default sync options.
    pub sync: SyncConfig,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token.
    pub token: Option<String>,
    /// REST API root.
    pub api_url: String,
    /// Proactive pacing per credential; 0 disables it.
    pub requests_per_second: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            requests_per_second: rate_limits::GITHUB_DEFAULT_RPS,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Snapshot file. Defaults to the state directory.
    pub path: Option<PathBuf>,
    pub max_bytes: usize,
    pub flush_interval_secs: u64,
    pub ttl: TtlSection,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: None,
            max_bytes: DEFAULT_MAX_BYTES,
            flush_interval_secs: 30,
            ttl: TtlSection::default(),
        }
    }
}

/// Per-category TTLs in seconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TtlSection {
    pub repositories_secs: u64,
    pub branches_secs: u64,
    pub commits_secs: u64,
    pub employees_secs: u64,
}

impl Default for TtlSection {
    fn default() -> Self {
        let ttls = CacheTtls::default();
        Self {
            repositories_secs: ttls.repositories.as_secs(),
            branches_secs: ttls.branches.as_secs(),
            commits_secs: ttls.commits.as_secs(),
            employees_secs: ttls.employees.as_secs(),
        }
    }
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    /// Look-back when neither `--since` nor a watermark is available.
    pub lookback_days: i64,
    pub members_only: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: 1000,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            members_only: false,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/orgpulse/config.toml)
    /// 3. Local config file (./orgpulse.toml)
    /// 4. Environment variables with the ORGPULSE_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("orgpulse.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./orgpulse.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // ORGPULSE_SYNC__BATCH_SIZE -> sync.batch_size
        builder = builder.add_source(
            Environment::with_prefix("ORGPULSE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config = match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        };

        if config.github.token.is_none() {
            config.github.token = std::env::var("GITHUB_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty());
        }
        config
    }

    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone()
    }

    /// Cache snapshot path, falling back to `cache.json` in the state directory.
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache
            .path
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join("cache.json")))
    }

    /// Watermark document path, next to the cache snapshot.
    pub fn watermark_path(&self) -> Option<PathBuf> {
        self.cache_path().map(|p| p.with_file_name("watermarks.json"))
    }

    pub fn cache_config(&self) -> CacheConfig {
        let ttl = &self.cache.ttl;
        CacheConfig {
            path: self.cache_path(),
            max_bytes: self.cache.max_bytes,
            ttls: CacheTtls {
                repositories: Duration::from_secs(ttl.repositories_secs),
                branches: Duration::from_secs(ttl.branches_secs),
                commits: Duration::from_secs(ttl.commits_secs),
                employees: Duration::from_secs(ttl.employees_secs),
            },
            flush_interval: Duration::from_secs(self.cache.flush_interval_secs.max(1)),
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            batch_size: self.sync.batch_size.max(1),
            batch_delay: Duration::from_millis(self.sync.batch_delay_ms),
            lookback: chrono::Duration::days(self.sync.lookback_days.max(0)),
            members_only: self.sync.members_only,
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "orgpulse").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/orgpulse` or `~/.local/state/orgpulse`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "orgpulse").map(|dirs| {
            // state_dir() returns None on macOS/Windows
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
