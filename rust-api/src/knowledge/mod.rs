//! Racer knowledge base
//!
//! Loads the line-delimited JSON knowledge file into an in-memory index
//! keyed by register number and normalized name.
//!
//! # Example
//!
//! ```no_run
//! use dlogic::config::KnowledgeConfig;
//! use dlogic::knowledge::KnowledgeStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = KnowledgeStore::new(KnowledgeConfig::from_env())?;
//!     let index = store.index().await?;
//!     println!("{} racers from {}", index.len(), index.metadata.source);
//!     Ok(())
//! }
//! ```

mod entry;
mod index;
mod source;
mod store;

pub use entry::{parse_line, KnowledgeEntry, ParsedLine, SkipReason};
pub use index::{normalize_name, KnowledgeIndex, KnowledgeMetadata, Lookup};
pub use source::{SourceChain, SourceProvider, SourceText};
pub use store::KnowledgeStore;

use std::path::PathBuf;
use thiserror::Error;

/// Knowledge acquisition errors
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Failed to read knowledge file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Knowledge download failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Knowledge download failed: {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("No knowledge source configured")]
    NoSource,
}
