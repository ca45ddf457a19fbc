//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Crawl loop behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Monthly call budget
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Upstream search API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Durable state and output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Downstream record sinks
    #[serde(default)]
    pub sinks: SinksConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.campaign.trim().is_empty() {
            return Err(AppError::validation("crawler.campaign is empty"));
        }
        if self.crawler.cycle_period_secs() == 0 {
            return Err(AppError::validation(
                "crawler.cycle_minutes and crawler.cycle_seconds are both 0",
            ));
        }
        if self.quota.budget_max <= 0 {
            return Err(AppError::validation("quota.budget_max must be > 0"));
        }
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::validation("api.user_agent is empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::validation("api.timeout_secs must be > 0"));
        }
        if self.sinks.graph.chunk_size == 0 {
            return Err(AppError::validation("sinks.graph.chunk_size must be > 0"));
        }
        if self.sinks.graph.enabled && self.sinks.graph.uri.trim().is_empty() {
            return Err(AppError::validation(
                "sinks.graph.uri is empty but the graph sink is enabled",
            ));
        }
        Ok(())
    }
}

/// Crawl loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Campaign tag stamped onto every stored record
    #[serde(default = "defaults::campaign")]
    pub campaign: String,

    /// Idle time between cycles, minutes part
    #[serde(default = "defaults::cycle_minutes")]
    pub cycle_minutes: u64,

    /// Idle time between cycles, seconds part
    #[serde(default)]
    pub cycle_seconds: u64,

    /// Deduplicate tweets by id during normalization
    #[serde(default = "defaults::dedupe")]
    pub dedupe: bool,
}

impl CrawlerConfig {
    /// Total idle time between cycles in seconds.
    pub fn cycle_period_secs(&self) -> u64 {
        self.cycle_minutes * 60 + self.cycle_seconds
    }

    /// Idle time between cycles.
    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs(self.cycle_period_secs())
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            campaign: defaults::campaign(),
            cycle_minutes: defaults::cycle_minutes(),
            cycle_seconds: 0,
            dedupe: defaults::dedupe(),
        }
    }
}

/// Monthly budget used when no quota file exists yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "defaults::budget_max")]
    pub budget_max: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            budget_max: defaults::budget_max(),
        }
    }
}

/// Upstream HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the v2 API
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Environment variable holding the bearer token
    #[serde(default = "defaults::bearer_token_env")]
    pub bearer_token_env: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// How many times one request may wait out a rate limit
    #[serde(default = "defaults::max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Longest single rate-limit wait in seconds
    #[serde(default = "defaults::max_rate_limit_wait")]
    pub max_rate_limit_wait_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            bearer_token_env: defaults::bearer_token_env(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_rate_limit_waits: defaults::max_rate_limit_waits(),
            max_rate_limit_wait_secs: defaults::max_rate_limit_wait(),
        }
    }
}

/// File locations, relative to the storage directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::query_file")]
    pub query_file: PathBuf,

    #[serde(default = "defaults::quota_file")]
    pub quota_file: PathBuf,

    #[serde(default = "defaults::lock_file")]
    pub lock_file: PathBuf,

    #[serde(default = "defaults::document_dir")]
    pub document_dir: PathBuf,
}

impl PathsConfig {
    pub fn query_file(&self, root: &Path) -> PathBuf {
        resolve(root, &self.query_file)
    }

    pub fn quota_file(&self, root: &Path) -> PathBuf {
        resolve(root, &self.quota_file)
    }

    pub fn lock_file(&self, root: &Path) -> PathBuf {
        resolve(root, &self.lock_file)
    }

    pub fn document_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.document_dir)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            query_file: defaults::query_file(),
            quota_file: defaults::quota_file(),
            lock_file: defaults::lock_file(),
            document_dir: defaults::document_dir(),
        }
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Downstream sink settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SinksConfig {
    #[serde(default)]
    pub graph: GraphSinkConfig,

    #[serde(default)]
    pub documents: DocumentSinkConfig,
}

/// Neo4j connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSinkConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "defaults::graph_uri")]
    pub uri: String,

    #[serde(default = "defaults::graph_database")]
    pub database: String,

    #[serde(default = "defaults::graph_user")]
    pub user: String,

    /// Environment variable holding the password
    #[serde(default = "defaults::graph_password_env")]
    pub password_env: String,

    /// Records per import statement
    #[serde(default = "defaults::graph_chunk_size")]
    pub chunk_size: usize,
}

impl Default for GraphSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            uri: defaults::graph_uri(),
            database: defaults::graph_database(),
            user: defaults::graph_user(),
            password_env: defaults::graph_password_env(),
            chunk_size: defaults::graph_chunk_size(),
        }
    }
}

/// Local document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSinkConfig {
    #[serde(default = "defaults::documents_enabled")]
    pub enabled: bool,
}

impl Default for DocumentSinkConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::documents_enabled(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn campaign() -> String {
        "default".into()
    }
    pub fn cycle_minutes() -> u64 {
        15
    }
    pub fn dedupe() -> bool {
        true
    }

    // Quota defaults
    pub fn budget_max() -> i64 {
        500_000
    }

    // API defaults
    pub fn base_url() -> String {
        "https://api.twitter.com/2".into()
    }
    pub fn bearer_token_env() -> String {
        "TWITTER_BEARER_TOKEN".into()
    }
    pub fn user_agent() -> String {
        "twecrawl/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_rate_limit_waits() -> u32 {
        3
    }
    pub fn max_rate_limit_wait() -> u64 {
        900
    }

    // Path defaults
    pub fn query_file() -> PathBuf {
        "queries.json".into()
    }
    pub fn quota_file() -> PathBuf {
        "quota.json".into()
    }
    pub fn lock_file() -> PathBuf {
        "crawler.lock".into()
    }
    pub fn document_dir() -> PathBuf {
        "documents".into()
    }

    // Sink defaults
    pub fn graph_uri() -> String {
        "bolt://localhost:7687".into()
    }
    pub fn graph_database() -> String {
        "twitter".into()
    }
    pub fn graph_user() -> String {
        "neo4j".into()
    }
    pub fn graph_password_env() -> String {
        "NEO4J_PASSWORD".into()
    }
    pub fn graph_chunk_size() -> usize {
        5000
    }
    pub fn documents_enabled() -> bool {
        true
    }
}
