//! Read-only racer index
//!
//! Provides O(1) lookup by register number with a normalized-name fallback.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::entry::{parse_line, KnowledgeEntry, ParsedLine, SkipReason};
use crate::models::ReleaseSummary;

/// Index-wide metadata
#[derive(Debug, Clone)]
pub struct KnowledgeMetadata {
    pub total_entries: usize,
    /// release year -> entry count
    pub releases: BTreeMap<i32, ReleaseSummary>,
    /// Where the knowledge text was loaded from
    pub source: String,
    pub generated_at: String,
    /// Lines dropped while parsing (malformed or without register number)
    pub skipped_lines: usize,
}

/// Lookup keys for a racer
#[derive(Debug, Clone, Copy, Default)]
pub struct Lookup<'a> {
    pub register_number: Option<&'a str>,
    pub name: Option<&'a str>,
}

/// Knowledge entries indexed by register number and normalized name
#[derive(Debug, Clone)]
pub struct KnowledgeIndex {
    by_register: HashMap<String, Arc<KnowledgeEntry>>,
    by_name: HashMap<String, Arc<KnowledgeEntry>>,
    pub metadata: KnowledgeMetadata,
}

impl KnowledgeIndex {
    /// Build the index from the full knowledge text
    ///
    /// Malformed lines are logged and skipped. A later line with the same
    /// register number replaces the earlier one.
    pub fn parse(text: &str, source: impl Into<String>) -> Self {
        let mut skipped_lines = 0;
        let entries = text
            .lines()
            .enumerate()
            .filter_map(|(line_no, line)| match parse_line(line) {
                ParsedLine::Parsed(entry) => Some(*entry),
                ParsedLine::Skipped(SkipReason::Blank) => None,
                ParsedLine::Skipped(SkipReason::Malformed(e)) => {
                    warn!("Failed to parse knowledge line {}: {}", line_no + 1, e);
                    skipped_lines += 1;
                    None
                }
                ParsedLine::Skipped(SkipReason::MissingRegisterNumber) => {
                    debug!("Knowledge line {} has no register number", line_no + 1);
                    skipped_lines += 1;
                    None
                }
            })
            .collect::<Vec<_>>();

        let mut index = Self::from_entries(entries, source);
        index.metadata.skipped_lines = skipped_lines;
        index
    }

    /// Build an index directly from entries, in order
    pub fn from_entries(entries: Vec<KnowledgeEntry>, source: impl Into<String>) -> Self {
        let mut by_register: HashMap<String, Arc<KnowledgeEntry>> = HashMap::new();
        let mut by_name: HashMap<String, Arc<KnowledgeEntry>> = HashMap::new();
        let mut releases: BTreeMap<i32, ReleaseSummary> = BTreeMap::new();

        for entry in entries {
            if entry.register_number.is_empty() {
                continue;
            }
            let entry = Arc::new(entry);

            if let Some(year) = entry.release_year {
                releases
                    .entry(year)
                    .or_insert_with(|| ReleaseSummary {
                        term: entry.release_term.clone(),
                        count: 0,
                    })
                    .count += 1;
            }

            let name_key = normalize_name(&entry.name_kanji);
            if !name_key.is_empty() {
                by_name.insert(name_key, Arc::clone(&entry));
            }
            by_register.insert(entry.register_number.clone(), entry);
        }

        Self {
            metadata: KnowledgeMetadata {
                total_entries: by_register.len(),
                releases,
                source: source.into(),
                generated_at: Utc::now().to_rfc3339(),
                skipped_lines: 0,
            },
            by_register,
            by_name,
        }
    }

    /// Find an entry by register number, then by normalized name
    pub fn find(&self, lookup: Lookup<'_>) -> Option<&KnowledgeEntry> {
        if let Some(entry) = lookup
            .register_number
            .and_then(|n| self.by_register.get(n))
        {
            return Some(entry.as_ref());
        }

        let key = normalize_name(lookup.name?);
        if key.is_empty() {
            return None;
        }
        self.by_name.get(&key).map(|entry| entry.as_ref())
    }

    pub fn get(&self, register_number: &str) -> Option<&KnowledgeEntry> {
        self.by_register.get(register_number).map(|entry| entry.as_ref())
    }

    /// All entries, in no particular order
    pub fn entries(&self) -> impl Iterator<Item = &KnowledgeEntry> {
        self.by_register.values().map(|entry| entry.as_ref())
    }

    /// Number of unique racers in the index
    pub fn len(&self) -> usize {
        self.by_register.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_register.is_empty()
    }
}

/// Strip all whitespace (full-width included) and lowercase
pub fn normalize_name(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}
