//! Environment-driven configuration

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default remote knowledge file
pub const DEFAULT_KNOWLEDGE_URL: &str =
    "https://pub-059afaafefa84116b57d57e0a72b81bd.r2.dev/boat_race_2020_2025.jsonl";
/// Bundled knowledge file, relative to the working directory
pub const DEFAULT_LOCAL_PATH: &str = "data/processed/boat_race_2020_2025.jsonl";
/// On-disk copy of the last remote download
pub const DEFAULT_CACHE_PATH: &str = "/tmp/boat_knowledge_cache.jsonl";
const DEFAULT_CACHE_TTL_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where and how the knowledge base is acquired
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    /// Explicit knowledge file, tried first
    pub override_path: Option<PathBuf>,
    /// File shipped with the deployment
    pub bundled_path: PathBuf,
    /// Remote URL, or a file path when it has no http(s) scheme
    pub remote_url: String,
    pub cache_path: PathBuf,
    pub cache_ttl: Duration,
    /// Remote request timeout
    pub timeout: Duration,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            override_path: None,
            bundled_path: resolve_path(DEFAULT_LOCAL_PATH),
            remote_url: DEFAULT_KNOWLEDGE_URL.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl KnowledgeConfig {
    /// Build configuration from `BOAT_KNOWLEDGE_*` variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            override_path: value("BOAT_KNOWLEDGE_SOURCE").map(|p| resolve_path(&p)),
            bundled_path: value("BOAT_KNOWLEDGE_LOCAL_PATH")
                .map(|p| resolve_path(&p))
                .unwrap_or(defaults.bundled_path),
            remote_url: value("BOAT_KNOWLEDGE_URL").unwrap_or(defaults.remote_url),
            cache_path: value("BOAT_KNOWLEDGE_CACHE_PATH")
                .map(|p| resolve_path(&p))
                .unwrap_or(defaults.cache_path),
            cache_ttl: value("BOAT_KNOWLEDGE_CACHE_TTL_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache_ttl),
            timeout: value("BOAT_KNOWLEDGE_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Use a single local file as the knowledge source
    pub fn with_override<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.override_path = Some(resolve_path(path.into()));
        self
    }
}

/// Server bind address from `HOST` / `PORT`
pub fn server_addr() -> String {
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    format!("{}:{}", host, port)
}

/// Log level from `DLOGIC_LOG`
pub fn log_level() -> tracing::Level {
    match env::var("DLOGIC_LOG")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

/// Resolve relative paths against the working directory
pub fn resolve_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
