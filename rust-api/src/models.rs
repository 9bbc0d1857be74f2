use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Race being analysed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceContext {
    pub race_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_condition: Option<String>,
}

impl RaceContext {
    pub fn new(race_id: impl Into<String>) -> Self {
        Self {
            race_id: race_id.into(),
            ..Default::default()
        }
    }
}

/// Racer entered in a race, identified by name and/or register number
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane: Option<u8>,
    /// Overrides the branch recorded in the knowledge base
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl ParticipantInput {
    pub fn by_register(register_number: impl Into<String>) -> Self {
        Self {
            register_number: Some(register_number.into()),
            ..Default::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_lane(mut self, lane: u8) -> Self {
        self.lane = Some(lane);
        self
    }
}

/// How much primary metric data backs a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    None,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::None => "none",
        }
    }
}

/// Intermediate values of the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    pub base_score: f64,
    pub primary_score: f64,
    pub secondary_score: f64,
    pub experience_bonus: f64,
    pub recency_multiplier: f64,
    pub grade_factor: f64,
    pub venue_bonus: f64,
}

impl Default for ScoreComponents {
    fn default() -> Self {
        Self {
            base_score: 0.0,
            primary_score: 0.0,
            secondary_score: 0.0,
            experience_bonus: 0.0,
            recency_multiplier: 1.0,
            grade_factor: 1.0,
            venue_bonus: 0.0,
        }
    }
}

/// Vintage of the knowledge snapshot an entry came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

/// Scored (or missing) participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub score: f64,
    /// 1-based among scored participants, 0 when knowledge data is missing
    pub rank: u32,
    pub confidence: Confidence,
    pub data_available: bool,
    pub components: ScoreComponents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_info: Option<ReleaseInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_reason: Option<String>,
}

/// Entry count for one release year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub term: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub knowledge_size: usize,
    pub releases: BTreeMap<i32, ReleaseSummary>,
}

/// Engine output for one race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    pub race_id: String,
    pub generated_at: String,
    pub knowledge_source: String,
    pub participants: Vec<ScoreResult>,
    pub metadata: ResponseMetadata,
}

/// Raw engine request body
///
/// `raceId` and `participants` stay loosely typed so that the handler can
/// reject bad shapes with a 400 instead of a deserialization failure.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRequestBody {
    #[serde(default)]
    pub race_id: Option<serde_json::Value>,
    #[serde(default)]
    pub race_date: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub water_condition: Option<String>,
    #[serde(default)]
    pub participants: Option<serde_json::Value>,
}

/// Knowledge refresh response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub knowledge_source: String,
    pub knowledge_size: usize,
    pub generated_at: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub knowledge_loaded: bool,
    pub knowledge_size: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"high\"");
        assert_eq!(serde_json::to_string(&Confidence::None).unwrap(), "\"none\"");
        assert_eq!(Confidence::Medium.as_str(), "medium");
    }

    #[test]
    fn test_request_body_camel_case() {
        let json = r#"{
            "raceId": "20240115-23-01",
            "venue": "唐津",
            "waterCondition": "calm",
            "participants": [{"registerNumber": "4444", "lane": 1}]
        }"#;

        let body: EngineRequestBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.race_id, Some(serde_json::json!("20240115-23-01")));
        assert_eq!(body.venue.as_deref(), Some("唐津"));
        assert_eq!(body.water_condition.as_deref(), Some("calm"));
        assert_eq!(
            body.participants
                .as_ref()
                .and_then(|p| p.as_array())
                .map(|p| p.len()),
            Some(1)
        );
    }

    #[test]
    fn test_missing_result_omits_optional_fields() {
        let result = ScoreResult {
            name: "不明".to_string(),
            register_number: None,
            lane: None,
            branch: None,
            score: 0.0,
            rank: 0,
            confidence: Confidence::None,
            data_available: false,
            components: ScoreComponents::default(),
            release_info: None,
            knowledge_source: None,
            missing_reason: Some("missing".to_string()),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["dataAvailable"], false);
        assert_eq!(value["components"]["recencyMultiplier"], 1.0);
        assert!(value.get("registerNumber").is_none());
        assert!(value.get("releaseInfo").is_none());
    }

    #[test]
    fn test_release_keys_serialize_as_strings() {
        let mut releases = BTreeMap::new();
        releases.insert(
            2024,
            ReleaseSummary {
                term: Some("前期".to_string()),
                count: 3,
            },
        );
        let metadata = ResponseMetadata {
            knowledge_size: 3,
            releases,
        };

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["knowledgeSize"], 3);
        assert_eq!(value["releases"]["2024"]["count"], 3);
        assert_eq!(value["releases"]["2024"]["term"], "前期");
    }
}
