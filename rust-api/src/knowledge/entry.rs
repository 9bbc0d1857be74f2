//! Knowledge records and per-line parsing

use serde::{Deserialize, Serialize};

/// One racer's historical record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Origin file or batch of the record
    pub source: String,
    pub register_number: String,
    pub name_kanji: String,
    pub name_kana: String,
    pub branch: String,
    pub grade: String,
    pub profile_code: String,
    pub release_year: Option<i32>,
    pub release_month: Option<u32>,
    pub release_term: Option<String>,
    /// Most significant metrics first, up to 25 slots
    pub metrics_primary: Vec<Option<f64>>,
    /// Supplementary metrics, up to 20 slots
    pub metrics_secondary: Vec<Option<f64>>,
    pub birthplace: Option<String>,
}

impl KnowledgeEntry {
    pub fn primary_available(&self) -> usize {
        self.metrics_primary.iter().flatten().count()
    }

    pub fn secondary_available(&self) -> usize {
        self.metrics_secondary.iter().flatten().count()
    }
}

/// Loosely typed line as found in the JSONL file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    source: Option<String>,
    register_number: Option<String>,
    name_kanji: Option<String>,
    name_kana: Option<String>,
    branch: Option<String>,
    grade: Option<String>,
    profile_code: Option<String>,
    release_year: Option<i32>,
    release_month: Option<u32>,
    release_term: Option<String>,
    metrics_primary: Option<Vec<Option<f64>>>,
    metrics_secondary: Option<Vec<Option<f64>>>,
    birthplace: Option<String>,
}

/// Why a line did not produce an entry
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Blank,
    Malformed(String),
    MissingRegisterNumber,
}

/// Outcome of parsing one line
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Parsed(Box<KnowledgeEntry>),
    Skipped(SkipReason),
}

/// Parse a single JSONL line
pub fn parse_line(line: &str) -> ParsedLine {
    let trimmed = line.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if trimmed.is_empty() {
        return ParsedLine::Skipped(SkipReason::Blank);
    }

    let raw: RawEntry = match serde_json::from_str(trimmed) {
        Ok(raw) => raw,
        Err(e) => return ParsedLine::Skipped(SkipReason::Malformed(e.to_string())),
    };

    let register_number = match raw.register_number {
        Some(n) if !n.trim().is_empty() => n,
        _ => return ParsedLine::Skipped(SkipReason::MissingRegisterNumber),
    };

    ParsedLine::Parsed(Box::new(KnowledgeEntry {
        source: raw.source.unwrap_or_default(),
        register_number,
        name_kanji: raw.name_kanji.unwrap_or_default(),
        name_kana: raw.name_kana.unwrap_or_default(),
        branch: raw.branch.unwrap_or_default(),
        grade: raw.grade.unwrap_or_default(),
        profile_code: raw.profile_code.unwrap_or_default(),
        release_year: raw.release_year,
        release_month: raw.release_month,
        release_term: raw.release_term,
        metrics_primary: raw.metrics_primary.unwrap_or_default(),
        metrics_secondary: raw.metrics_secondary.unwrap_or_default(),
        birthplace: raw.birthplace,
    }))
}
