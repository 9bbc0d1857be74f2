//! Composite score for a single racer
//!
//! score = clamp(0, 120, (base + venue) × recency × grade), where
//!     base = primary × 0.72 + secondary × 0.18 + experience

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

use super::tables::{expected_branch, grade_strength};
use crate::knowledge::KnowledgeEntry;
use crate::models::{Confidence, ParticipantInput, RaceContext, ReleaseInfo, ScoreComponents, ScoreResult};

pub const MAX_SCORE: f64 = 120.0;
const PRIMARY_SHARE: f64 = 0.72;
const SECONDARY_SHARE: f64 = 0.18;
const VENUE_BONUS: f64 = 2.5;
const RECENCY_DECAY_PER_YEAR: f64 = 0.03;
const RECENCY_FLOOR: f64 = 0.82;
const GRADE_FACTOR_MIN: f64 = 0.85;
const GRADE_FACTOR_MAX: f64 = 1.35;

pub const MISSING_REASON: &str = "ナレッジに該当レーサーが存在しません";
pub const UNKNOWN_NAME: &str = "不明";

/// Arithmetic descending weights: `start - i * step`
#[derive(Debug, Clone, Copy)]
pub struct WeightSchedule {
    pub start: f64,
    pub step: f64,
    pub len: usize,
}

impl WeightSchedule {
    /// Weight of slot `i`; slots past the end reuse the last weight
    pub fn weight(&self, i: usize) -> f64 {
        let i = i.min(self.len.saturating_sub(1));
        self.start - i as f64 * self.step
    }
}

pub const PRIMARY_WEIGHTS: WeightSchedule = WeightSchedule {
    start: 3.0,
    step: 0.08,
    len: 25,
};

pub const SECONDARY_WEIGHTS: WeightSchedule = WeightSchedule {
    start: 1.2,
    step: 0.04,
    len: 20,
};

/// Weighted average over present values only
pub fn weighted_average(values: &[Option<f64>], weights: &WeightSchedule) -> f64 {
    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;

    for (i, value) in values.iter().enumerate() {
        let Some(value) = value.filter(|v| !v.is_nan()) else {
            continue;
        };
        let weight = weights.weight(i);
        if weight <= 0.0 {
            continue;
        }
        total_weight += weight;
        weighted_sum += value * weight;
    }

    if total_weight == 0.0 {
        return 0.0;
    }
    weighted_sum / total_weight
}

/// Bonus for the amount of history available
pub fn experience_bonus(entry: &KnowledgeEntry) -> f64 {
    match entry.primary_available() + entry.secondary_available() {
        n if n >= 40 => 6.0,
        n if n >= 30 => 4.0,
        n if n >= 20 => 2.0,
        n if n >= 10 => 1.0,
        _ => 0.0,
    }
}

pub fn confidence(entry: &KnowledgeEntry) -> Confidence {
    match entry.primary_available() {
        n if n >= 18 => Confidence::High,
        n if n >= 12 => Confidence::Medium,
        n if n > 0 => Confidence::Low,
        _ => Confidence::None,
    }
}

/// Year of the race, or of `now` when the date is absent or unparseable
pub fn race_year(race_date: Option<&str>, now: DateTime<Utc>) -> i32 {
    race_date.and_then(parse_year).unwrap_or_else(|| now.year())
}

fn parse_year(value: &str) -> Option<i32> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.year());
    }
    // local date-time without an offset; %.f also accepts no fraction
    let local = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok());
    if let Some(dt) = local {
        return Some(dt.year());
    }
    ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .map(|date| date.year())
}

/// Decay for knowledge older than the race
pub fn recency_multiplier(release_year: Option<i32>, race_year: i32) -> f64 {
    let Some(release_year) = release_year.filter(|y| *y > 0) else {
        return 1.0;
    };
    let years = (race_year - release_year).max(0) as f64;
    (1.0 - years * RECENCY_DECAY_PER_YEAR).max(RECENCY_FLOOR)
}

/// Race grade strength relative to the grade the data was drawn from
pub fn grade_factor(race_grade: Option<&str>, entry_grade: &str) -> f64 {
    let target = race_grade.and_then(grade_strength).unwrap_or(1.0);
    let entry = grade_strength(entry_grade).unwrap_or(1.0);
    (target / entry).clamp(GRADE_FACTOR_MIN, GRADE_FACTOR_MAX)
}

/// Bonus when the racer's branch is local to the venue
pub fn venue_bonus(venue: Option<&str>, branch: &str) -> f64 {
    match venue.and_then(expected_branch) {
        Some(expected) if !branch.is_empty() && branch == expected => VENUE_BONUS,
        _ => 0.0,
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Score a participant that has a knowledge entry
///
/// The result is unranked (rank 0) until the race is ranked as a whole.
pub fn score_entry(
    entry: &KnowledgeEntry,
    context: &RaceContext,
    participant: &ParticipantInput,
    knowledge_source: &str,
    now: DateTime<Utc>,
) -> ScoreResult {
    let branch = participant
        .branch
        .clone()
        .unwrap_or_else(|| entry.branch.clone());

    let primary_score = weighted_average(&entry.metrics_primary, &PRIMARY_WEIGHTS);
    let secondary_score = weighted_average(&entry.metrics_secondary, &SECONDARY_WEIGHTS);
    let experience_bonus = experience_bonus(entry);
    let recency_multiplier = recency_multiplier(
        entry.release_year,
        race_year(context.race_date.as_deref(), now),
    );
    let grade_factor = grade_factor(context.grade.as_deref(), &entry.grade);
    let venue_bonus = venue_bonus(context.venue.as_deref(), &branch);

    let base_score =
        primary_score * PRIMARY_SHARE + secondary_score * SECONDARY_SHARE + experience_bonus;
    let adjusted = (base_score + venue_bonus) * recency_multiplier * grade_factor;
    let score = round_to(adjusted.clamp(0.0, MAX_SCORE), 1);

    ScoreResult {
        name: entry.name_kanji.clone(),
        register_number: Some(entry.register_number.clone()),
        lane: participant.lane,
        branch: Some(branch),
        score,
        rank: 0,
        confidence: confidence(entry),
        data_available: true,
        components: ScoreComponents {
            base_score: round_to(base_score, 1),
            primary_score: round_to(primary_score, 1),
            secondary_score: round_to(secondary_score, 1),
            experience_bonus,
            recency_multiplier: round_to(recency_multiplier, 2),
            grade_factor: round_to(grade_factor, 2),
            venue_bonus: round_to(venue_bonus, 1),
        },
        release_info: Some(ReleaseInfo {
            year: entry.release_year,
            month: entry.release_month,
            term: entry.release_term.clone(),
        }),
        knowledge_source: Some(knowledge_source.to_string()),
        missing_reason: None,
    }
}

/// Placeholder for a participant with no knowledge entry
pub fn missing_score(participant: &ParticipantInput) -> ScoreResult {
    ScoreResult {
        name: participant
            .name
            .clone()
            .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        register_number: participant.register_number.clone(),
        lane: participant.lane,
        branch: participant.branch.clone(),
        score: 0.0,
        rank: 0,
        confidence: Confidence::None,
        data_available: false,
        components: ScoreComponents::default(),
        release_info: None,
        knowledge_source: None,
        missing_reason: Some(MISSING_REASON.to_string()),
    }
}
