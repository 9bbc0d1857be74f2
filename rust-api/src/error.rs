use actix_web::{
    error::JsonPayloadError, http::StatusCode, HttpRequest, HttpResponse, ResponseError,
};
use std::fmt;

use crate::engine::EngineError;
use crate::models::{EngineRequestBody, ErrorResponse, ParticipantInput, RaceContext};

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Invalid request data
    ValidationError(String),
    /// Engine or knowledge failure
    EngineError { message: String, details: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::EngineError { message, details } => write!(f, "{}: {}", message, details),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Engine failures surface as a 500 unless the request itself was bad
    pub fn from_engine(message: &str, err: EngineError) -> Self {
        if err.is_validation() {
            AppError::ValidationError(err.to_string())
        } else {
            AppError::EngineError {
                message: message.to_string(),
                details: err.to_string(),
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::EngineError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::ValidationError(msg) => ErrorResponse {
                error: msg.clone(),
                details: None,
            },
            AppError::EngineError { message, details } => ErrorResponse {
                error: message.clone(),
                details: Some(details.clone()),
            },
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Validation functions
pub fn validate_race_id(race_id: Option<&serde_json::Value>) -> Result<String, AppError> {
    match race_id.and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(AppError::ValidationError("raceId is required".to_string())),
    }
}

/// Keep participants that carry a string name or register number
pub fn validate_participants(
    participants: Option<&serde_json::Value>,
) -> Result<Vec<ParticipantInput>, AppError> {
    let items = match participants.and_then(|v| v.as_array()) {
        Some(items) if !items.is_empty() => items,
        _ => {
            return Err(AppError::ValidationError(
                "participants must be a non-empty array".to_string(),
            ))
        }
    };

    let valid: Vec<ParticipantInput> = items.iter().filter_map(participant_from_value).collect();
    if valid.is_empty() {
        return Err(AppError::ValidationError(
            "participants must include at least one valid entry".to_string(),
        ));
    }
    Ok(valid)
}

fn participant_from_value(value: &serde_json::Value) -> Option<ParticipantInput> {
    let obj = value.as_object()?;
    let text = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(str::to_string);

    let name = text("name");
    let register_number = text("registerNumber");
    if name.is_none() && register_number.is_none() {
        return None;
    }

    Some(ParticipantInput {
        name,
        register_number,
        lane: obj.get("lane").and_then(lane_from_value),
        branch: text("branch"),
    })
}

/// Lane as an integer, also accepting integral floats like `1.0`
fn lane_from_value(value: &serde_json::Value) -> Option<u8> {
    let lane = match value.as_u64() {
        Some(lane) => lane,
        None => {
            let f = value.as_f64()?;
            if f.fract() != 0.0 || f < 0.0 || f > f64::from(u8::MAX) {
                return None;
            }
            f as u64
        }
    };
    u8::try_from(lane).ok()
}

/// Turn a raw body into engine inputs
pub fn validate_request(
    body: EngineRequestBody,
) -> Result<(RaceContext, Vec<ParticipantInput>), AppError> {
    let race_id = validate_race_id(body.race_id.as_ref())?;
    let participants = validate_participants(body.participants.as_ref())?;

    let context = RaceContext {
        race_id,
        race_date: body.race_date,
        venue: body.venue,
        grade: body.grade,
        weather: body.weather,
        water_condition: body.water_condition,
    };
    Ok((context, participants))
}

/// Malformed JSON bodies get the same 400 shape as validation failures
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::debug!("Rejected request body: {}", err);
    AppError::ValidationError("Invalid request body".to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_race_id_valid() {
        assert_eq!(validate_race_id(Some(&json!("R1"))).unwrap(), "R1");
    }

    #[test]
    fn test_validate_race_id_invalid() {
        assert!(validate_race_id(None).is_err());
        assert!(validate_race_id(Some(&json!(""))).is_err());
        assert!(validate_race_id(Some(&json!(12))).is_err());
        assert!(validate_race_id(Some(&json!(null))).is_err());
    }

    #[test]
    fn test_validate_participants_filters_invalid() {
        let items = json!([
            {"name": "峰竜太", "lane": 1},
            {"lane": 2},
            "4320",
            {"registerNumber": "4444", "lane": 3, "branch": "埼玉"},
            {"registerNumber": 4444},
        ]);
        let participants = validate_participants(Some(&items)).unwrap();

        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].name.as_deref(), Some("峰竜太"));
        assert_eq!(participants[0].lane, Some(1));
        assert_eq!(participants[1].register_number.as_deref(), Some("4444"));
        assert_eq!(participants[1].branch.as_deref(), Some("埼玉"));
    }

    #[test]
    fn test_validate_participants_invalid() {
        assert!(validate_participants(None).is_err());
        assert!(validate_participants(Some(&json!([]))).is_err());
        assert!(validate_participants(Some(&json!("R1"))).is_err());

        let err = validate_participants(Some(&json!([{"lane": 1}]))).unwrap_err();
        assert!(err.to_string().contains("at least one valid entry"));
    }

    #[test]
    fn test_participant_lane_forms() {
        let items = json!([
            {"registerNumber": "1", "lane": 1.0},
            {"registerNumber": "2", "lane": 2.5},
            {"registerNumber": "3", "lane": 300},
            {"registerNumber": "4", "lane": "4"},
            {"registerNumber": "5", "lane": -1.0},
        ]);
        let lanes: Vec<Option<u8>> = validate_participants(Some(&items))
            .unwrap()
            .iter()
            .map(|p| p.lane)
            .collect();

        assert_eq!(lanes, vec![Some(1), None, None, None, None]);
    }

    #[test]
    fn test_validate_request() {
        let body: EngineRequestBody = serde_json::from_value(json!({
            "raceId": "R1",
            "venue": "唐津",
            "grade": "SG",
            "participants": [{"registerNumber": "4320"}]
        }))
        .unwrap();

        let (context, participants) = validate_request(body).unwrap();
        assert_eq!(context.race_id, "R1");
        assert_eq!(context.venue.as_deref(), Some("唐津"));
        assert_eq!(participants.len(), 1);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert!(err.to_string().contains("Validation error"));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::ValidationError("".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::EngineError {
                message: "".to_string(),
                details: "".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_engine() {
        let err = AppError::from_engine("Failed", EngineError::NoParticipants);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = AppError::from_engine(
            "Failed",
            EngineError::Knowledge(crate::knowledge::KnowledgeError::NoSource),
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("No knowledge source"));
    }
}
