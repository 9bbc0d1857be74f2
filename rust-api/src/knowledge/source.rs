//! Knowledge text acquisition
//!
//! Providers are tried in order. File providers decline when the file does
//! not exist; the final provider is the only one that fails the load outright.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::KnowledgeError;
use crate::config::{resolve_path, KnowledgeConfig};

/// Raw knowledge text and where it came from
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,
    pub source: String,
}

/// One way of obtaining the knowledge text
#[derive(Debug, Clone)]
pub enum SourceProvider {
    /// Explicitly configured file, skipped when missing
    Override(PathBuf),
    /// File shipped with the deployment, skipped when missing
    Bundled(PathBuf),
    /// Required file, missing is an error
    File(PathBuf),
    /// HTTP(S) download with an on-disk cache
    Remote {
        url: String,
        cache_path: PathBuf,
        cache_ttl: Duration,
    },
}

impl SourceProvider {
    fn label(&self) -> &'static str {
        match self {
            SourceProvider::Override(_) => "override",
            SourceProvider::Bundled(_) => "bundled",
            SourceProvider::File(_) => "file",
            SourceProvider::Remote { .. } => "remote",
        }
    }

    /// Read the text, or `None` when this provider declines
    async fn read(&self, client: &reqwest::Client) -> Result<Option<SourceText>, KnowledgeError> {
        match self {
            SourceProvider::Override(path) | SourceProvider::Bundled(path) => {
                match read_file(path).await {
                    Ok(text) => Ok(Some(text)),
                    Err(KnowledgeError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                        debug!("{} knowledge file {:?} not found", self.label(), path);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            SourceProvider::File(path) => read_file(path).await.map(Some),
            SourceProvider::Remote {
                url,
                cache_path,
                cache_ttl,
            } => read_remote(client, url, cache_path, *cache_ttl).await.map(Some),
        }
    }
}

/// Ordered list of providers sharing one HTTP client
pub struct SourceChain {
    providers: Vec<SourceProvider>,
    client: reqwest::Client,
}

impl SourceChain {
    pub fn new(providers: Vec<SourceProvider>, timeout: Duration) -> Result<Self, KnowledgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dlogic/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(KnowledgeError::Client)?;
        Ok(Self { providers, client })
    }

    /// Override file, then bundled file, then the remote URL
    pub fn from_config(config: &KnowledgeConfig) -> Result<Self, KnowledgeError> {
        let mut providers = Vec::with_capacity(3);
        if let Some(path) = &config.override_path {
            providers.push(SourceProvider::Override(path.clone()));
        }
        providers.push(SourceProvider::Bundled(config.bundled_path.clone()));

        if is_http_url(&config.remote_url) {
            providers.push(SourceProvider::Remote {
                url: config.remote_url.clone(),
                cache_path: config.cache_path.clone(),
                cache_ttl: config.cache_ttl,
            });
        } else {
            providers.push(SourceProvider::File(resolve_path(&config.remote_url)));
        }

        Self::new(providers, config.timeout)
    }

    pub fn providers(&self) -> &[SourceProvider] {
        &self.providers
    }

    /// Read from the first provider that yields text
    pub async fn read(&self) -> Result<SourceText, KnowledgeError> {
        for provider in &self.providers {
            debug!("Consulting {} knowledge source", provider.label());
            if let Some(text) = provider.read(&self.client).await? {
                info!("Knowledge read from {} source {}", provider.label(), text.source);
                return Ok(text);
            }
        }
        Err(KnowledgeError::NoSource)
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

async fn read_file(path: &Path) -> Result<SourceText, KnowledgeError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| KnowledgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(SourceText {
        text,
        source: path.display().to_string(),
    })
}

async fn cache_is_fresh(cache_path: &Path, ttl: Duration) -> bool {
    match tokio::fs::metadata(cache_path).await.and_then(|m| m.modified()) {
        // a modification time in the future counts as fresh
        Ok(modified) => modified.elapsed().map(|age| age < ttl).unwrap_or(true),
        Err(_) => false,
    }
}

async fn download(client: &reqwest::Client, url: &str) -> Result<String, KnowledgeError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(KnowledgeError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.text().await?)
}

async fn persist_cache(cache_path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = cache_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(cache_path, text).await
}

async fn read_remote(
    client: &reqwest::Client,
    url: &str,
    cache_path: &Path,
    cache_ttl: Duration,
) -> Result<SourceText, KnowledgeError> {
    if cache_is_fresh(cache_path, cache_ttl).await {
        debug!("Using cached knowledge at {:?}", cache_path);
        return read_file(cache_path).await;
    }

    info!("Downloading knowledge from {}", url);
    match download(client, url).await {
        Ok(text) => {
            let source = match persist_cache(cache_path, &text).await {
                Ok(()) => cache_path.display().to_string(),
                Err(e) => {
                    warn!("Failed to persist knowledge cache at {:?}: {}", cache_path, e);
                    url.to_string()
                }
            };
            Ok(SourceText { text, source })
        }
        Err(e) => {
            if tokio::fs::try_exists(cache_path).await.unwrap_or(false) {
                warn!("Knowledge download failed, using stale cache: {}", e);
                read_file(cache_path).await
            } else {
                Err(e)
            }
        }
    }
}
