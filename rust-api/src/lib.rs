//! D-Logic boat race scoring engine
//!
//! This library provides:
//! - A racer knowledge index loaded from line-delimited JSON
//! - Composite scoring, confidence classification and ranking per race
//! - Conversion of fixed-width fan data files into knowledge JSONL
//!
//! # Example
//!
//! ```no_run
//! use dlogic::engine::score_race;
//! use dlogic::knowledge::KnowledgeIndex;
//! use dlogic::models::{ParticipantInput, RaceContext};
//!
//! let index = KnowledgeIndex::parse(
//!     r#"{"register_number":"4320","name_kanji":"峰竜太","metrics_primary":[7.5]}"#,
//!     "inline",
//! );
//! let response = score_race(
//!     &index,
//!     &RaceContext::new("20250601-23-12"),
//!     &[ParticipantInput::by_register("4320")],
//!     chrono::Utc::now(),
//! );
//! println!("Score: {}", response.participants[0].score);
//! ```

pub mod config;
pub mod data;
pub mod engine;
pub mod knowledge;
pub mod models;

// API-specific modules (only available with api feature)
#[cfg(feature = "api")]
pub mod error;

// Re-export commonly used types
pub use engine::{score_race, EngineError, ScoringEngine};
pub use knowledge::{KnowledgeEntry, KnowledgeError, KnowledgeIndex, KnowledgeStore, Lookup};
pub use models::{
    Confidence, EngineResponse, ParticipantInput, RaceContext, ScoreComponents, ScoreResult,
};
