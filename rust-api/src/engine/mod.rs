//! Race scoring engine
//!
//! Looks up every participant in the knowledge index, computes a composite
//! score, and ranks the participants that have data.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dlogic::config::KnowledgeConfig;
//! use dlogic::engine::ScoringEngine;
//! use dlogic::knowledge::KnowledgeStore;
//! use dlogic::models::{ParticipantInput, RaceContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(KnowledgeStore::new(KnowledgeConfig::from_env())?);
//!     let engine = ScoringEngine::new(store);
//!
//!     let context = RaceContext::new("20250601-23-12");
//!     let participants = vec![ParticipantInput::by_register("4320").with_lane(1)];
//!     let response = engine.run(&context, &participants).await?;
//!     println!("{} ranked", response.participants.len());
//!     Ok(())
//! }
//! ```

pub mod scoring;
pub mod tables;

pub use scoring::{missing_score, score_entry, MAX_SCORE, MISSING_REASON};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::knowledge::{KnowledgeError, KnowledgeIndex, KnowledgeStore, Lookup};
use crate::models::{EngineResponse, ParticipantInput, RaceContext, ResponseMetadata};

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("raceId is required in context")]
    MissingRaceId,

    #[error("participants must contain at least one entry")]
    NoParticipants,

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}

impl EngineError {
    /// Whether the caller can fix the request
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::MissingRaceId | EngineError::NoParticipants)
    }
}

/// Scores races against the shared knowledge store
#[derive(Clone)]
pub struct ScoringEngine {
    store: Arc<KnowledgeStore>,
}

impl ScoringEngine {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Validate, load knowledge if needed, and score the race
    pub async fn run(
        &self,
        context: &RaceContext,
        participants: &[ParticipantInput],
    ) -> Result<EngineResponse, EngineError> {
        validate(context, participants)?;

        let index = self.store.index().await?;
        info!(
            "Scoring race {} with {} participants",
            context.race_id,
            participants.len()
        );

        Ok(score_race(&index, context, participants, Utc::now()))
    }
}

/// Reject requests the engine cannot score
pub fn validate(context: &RaceContext, participants: &[ParticipantInput]) -> Result<(), EngineError> {
    if context.race_id.trim().is_empty() {
        return Err(EngineError::MissingRaceId);
    }
    if participants.is_empty() {
        return Err(EngineError::NoParticipants);
    }
    Ok(())
}

/// Score and rank participants against a fixed index
///
/// Participants with data come first, ordered by descending score with ties
/// kept in input order and ranked from 1. Participants without data follow in
/// input order with rank 0.
pub fn score_race(
    index: &KnowledgeIndex,
    context: &RaceContext,
    participants: &[ParticipantInput],
    now: DateTime<Utc>,
) -> EngineResponse {
    let source = &index.metadata.source;

    let (mut present, missing): (Vec<_>, Vec<_>) = participants
        .iter()
        .map(|participant| {
            let lookup = Lookup {
                register_number: participant.register_number.as_deref(),
                name: participant.name.as_deref(),
            };
            match index.find(lookup) {
                Some(entry) => score_entry(entry, context, participant, source, now),
                None => {
                    debug!(
                        "No knowledge for participant {:?} / {:?}",
                        participant.register_number, participant.name
                    );
                    missing_score(participant)
                }
            }
        })
        .partition(|result| result.data_available);

    // stable: equal scores keep input order
    present.sort_by(|a, b| b.score.total_cmp(&a.score));
    for (i, result) in present.iter_mut().enumerate() {
        result.rank = i as u32 + 1;
    }
    present.extend(missing);

    EngineResponse {
        race_id: context.race_id.clone(),
        generated_at: now.to_rfc3339(),
        knowledge_source: source.clone(),
        participants: present,
        metadata: ResponseMetadata {
            knowledge_size: index.metadata.total_entries,
            releases: index.metadata.releases.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Confidence;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn line(register: &str, name: &str, metric: f64, count: usize) -> String {
        serde_json::json!({
            "source": "fan2504",
            "register_number": register,
            "name_kanji": name,
            "branch": "東京",
            "grade": "A1",
            "release_year": 2025,
            "release_term": "前期",
            "metrics_primary": vec![metric; count],
            "metrics_secondary": vec![metric; 20],
        })
        .to_string()
    }

    fn sample_index() -> KnowledgeIndex {
        let text = [
            line("1001", "強者", 8.0, 25),
            line("1002", "中堅", 6.0, 25),
            line("1003", "新人", 4.0, 5),
            line("1004", "同点", 6.0, 25),
            r#"{"register_number":"1005","name_kanji":"記録なし"}"#.to_string(),
        ]
        .join("\n");
        KnowledgeIndex::parse(&text, "memory")
    }

    fn participants() -> Vec<ParticipantInput> {
        vec![
            ParticipantInput::by_register("1003").with_lane(1),
            ParticipantInput::by_register("9999").with_lane(2),
            ParticipantInput::by_register("1002").with_lane(3),
            ParticipantInput::by_name("強 者").with_lane(4),
            ParticipantInput::by_name("幽霊").with_lane(5),
            ParticipantInput::by_register("1004").with_lane(6),
        ]
    }

    #[test]
    fn test_every_participant_has_a_result() {
        let response = score_race(&sample_index(), &RaceContext::new("R1"), &participants(), now());
        assert_eq!(response.participants.len(), 6);
        assert_eq!(response.race_id, "R1");
        assert_eq!(response.knowledge_source, "memory");
        assert_eq!(response.metadata.knowledge_size, 5);
        assert_eq!(response.metadata.releases[&2025].count, 4);
    }

    #[test]
    fn test_ranking_order() {
        let response = score_race(&sample_index(), &RaceContext::new("R1"), &participants(), now());
        let ranked: Vec<_> = response
            .participants
            .iter()
            .filter(|p| p.data_available)
            .collect();

        let ranks: Vec<u32> = ranked.iter().map(|p| p.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(ranked[0].register_number.as_deref(), Some("1001"));
        assert_eq!(ranked[0].lane, Some(4));
        // tie between 1002 (lane 3) and 1004 (lane 6) keeps input order
        assert_eq!(ranked[1].register_number.as_deref(), Some("1002"));
        assert_eq!(ranked[2].register_number.as_deref(), Some("1004"));
        assert_eq!(ranked[1].score, ranked[2].score);
        assert_eq!(ranked[3].register_number.as_deref(), Some("1003"));
    }

    #[test]
    fn test_missing_participants_follow_in_input_order() {
        let response = score_race(&sample_index(), &RaceContext::new("R1"), &participants(), now());
        let tail = &response.participants[4..];

        assert_eq!(tail[0].register_number.as_deref(), Some("9999"));
        assert_eq!(tail[1].name, "幽霊");
        for result in tail {
            assert!(!result.data_available);
            assert_eq!(result.rank, 0);
            assert_eq!(result.score, 0.0);
            assert_eq!(result.confidence, Confidence::None);
            assert!(result.missing_reason.as_deref().is_some_and(|r| !r.is_empty()));
        }
    }

    #[test]
    fn test_entry_without_primary_metrics() {
        let response = score_race(
            &sample_index(),
            &RaceContext::new("R1"),
            &[ParticipantInput::by_register("1005")],
            now(),
        );
        let result = &response.participants[0];

        assert!(result.data_available);
        assert_eq!(result.rank, 1);
        assert_eq!(result.confidence, Confidence::None);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_scores_within_bounds() {
        let context = RaceContext {
            venue: Some("平和島".to_string()),
            grade: Some("SG".to_string()),
            race_date: Some("2031-01-01".to_string()),
            ..RaceContext::new("R1")
        };
        let response = score_race(&sample_index(), &context, &participants(), now());

        for result in &response.participants {
            assert!((0.0..=MAX_SCORE).contains(&result.score));
            assert_eq!(result.score, (result.score * 10.0).round() / 10.0);
        }
    }

    #[test]
    fn test_deterministic() {
        let index = sample_index();
        let context = RaceContext {
            venue: Some("多摩川".to_string()),
            ..RaceContext::new("R1")
        };
        let first = score_race(&index, &context, &participants(), now());
        let second = score_race(&index, &context, &participants(), now());
        assert_eq!(first, second);
    }

    #[test]
    fn test_validate() {
        let context = RaceContext::new("R1");
        assert!(validate(&context, &participants()).is_ok());

        let err = validate(&RaceContext::new(""), &participants()).unwrap_err();
        assert!(matches!(err, EngineError::MissingRaceId));
        assert!(err.to_string().contains("raceId"));
        assert!(err.is_validation());

        let err = validate(&context, &[]).unwrap_err();
        assert!(matches!(err, EngineError::NoParticipants));
        assert!(err.to_string().contains("participants"));
    }

    #[tokio::test]
    async fn test_run_rejects_before_loading() {
        let engine = ScoringEngine::new(Arc::new(KnowledgeStore::from_index(sample_index())));

        let err = engine.run(&RaceContext::new("R1"), &[]).await.unwrap_err();
        assert!(err.to_string().contains("participants"));

        let err = engine
            .run(&RaceContext::new(""), &participants())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("raceId"));
    }

    #[tokio::test]
    async fn test_run_unknown_register() {
        let engine = ScoringEngine::new(Arc::new(KnowledgeStore::from_index(sample_index())));
        let response = engine
            .run(
                &RaceContext::new("R1"),
                &[ParticipantInput::by_register("9999")],
            )
            .await
            .unwrap();

        let result = &response.participants[0];
        assert!(!result.data_available);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.rank, 0);
        assert_eq!(result.confidence, Confidence::None);
        assert!(result.missing_reason.is_some());
    }
}
