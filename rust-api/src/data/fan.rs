//! Fan data parser
//!
//! Converts the fixed-width CP932 racer files published for fans into
//! knowledge JSONL, one record per racer.
//!
//! # Example
//!
//! ```no_run
//! use dlogic::data::fan::{parse_file, write_jsonl};
//! use std::path::Path;
//!
//! let records = parse_file(Path::new("fan2404.txt")).unwrap();
//! write_jsonl(&records, Path::new("data/processed/fan2404.jsonl")).unwrap();
//! ```

use encoding_rs::SHIFT_JIS;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Byte offsets of the fixed-width layout
const REGISTER: (usize, usize) = (0, 4);
const NAME_KANJI: (usize, usize) = (4, 20);
const NAME_KANA: (usize, usize) = (20, 35);
const BRANCH: (usize, usize) = (35, 39);
const GRADE: (usize, usize) = (39, 41);
const PROFILE: (usize, usize) = (41, 58);
const PRIMARY: (usize, usize) = (58, 158);
const GRADE_INFO_LEN: usize = 10;
const BIRTHPLACE_LEN: usize = 6;
const METRIC_WIDTH: usize = 4;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Release vintage inferred from a file name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Release {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub term: Option<String>,
}

/// One racer line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanRecord {
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
    pub metrics_primary_raw: Vec<String>,
    pub metrics_primary: Vec<Option<f64>>,
    pub grade_info: String,
    pub metrics_secondary_raw: Vec<String>,
    pub metrics_secondary: Vec<Option<f64>>,
    pub metrics_secondary_suffix: String,
    pub birthplace: String,
    pub raw_line: String,
    /// Compact one-line summary
    pub text: String,
}

fn release_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^fan(\d{2})(\d{2})").ok())
        .as_ref()
}

/// Infer release info from a stem like `fan2404`
pub fn infer_release(stem: &str) -> Release {
    let Some(caps) = release_pattern().and_then(|re| re.captures(stem)) else {
        return Release::default();
    };
    let year = caps[1].parse::<i32>().ok().map(|yy| 2000 + yy);
    let month = caps[2].parse::<u32>().ok();
    let term = month.map(|m| if m <= 6 { "前期" } else { "後期" }.to_string());
    Release { year, month, term }
}

/// Clamped byte range
fn field(line: &[u8], (start, end): (usize, usize)) -> &[u8] {
    let end = end.min(line.len());
    let start = start.min(end);
    &line[start..end]
}

fn decode_cp932(bytes: &[u8]) -> String {
    let (decoded, _) = SHIFT_JIS.decode_without_bom_handling(bytes);
    decoded
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string()
}

fn normalize_name(text: &str) -> String {
    text.replace('\u{3000}', " ").trim().to_string()
}

/// Split into 4-byte metric chunks: raw strings, values / 100, and leftover bytes
fn split_metrics(segment: &[u8]) -> (Vec<String>, Vec<Option<f64>>, String) {
    let chunks = segment.chunks_exact(METRIC_WIDTH);
    let suffix: String = chunks
        .remainder()
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();

    let (raw, values): (Vec<String>, Vec<Option<f64>>) = chunks
        .map(|chunk| {
            let raw = decode_ascii(chunk);
            let value = if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
                raw.parse::<u32>().ok().map(|v| v as f64 / 100.0)
            } else {
                None
            };
            (raw, value)
        })
        .unzip();

    (raw, values, suffix)
}

/// Parse one fixed-width record line
pub fn parse_record(raw: &[u8], source: &str, release: &Release) -> FanRecord {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let (metrics_primary_raw, metrics_primary, _) = split_metrics(field(line, PRIMARY));

    let remainder = field(line, (PRIMARY.1, line.len()));
    let grade_info = decode_ascii(field(remainder, (0, GRADE_INFO_LEN)));
    let birthplace_start = remainder.len().saturating_sub(BIRTHPLACE_LEN);
    let secondary = field(remainder, (GRADE_INFO_LEN, birthplace_start));
    let (metrics_secondary_raw, metrics_secondary, metrics_secondary_suffix) =
        split_metrics(secondary);
    let birthplace = normalize_name(&decode_cp932(&remainder[birthplace_start..]));

    let mut record = FanRecord {
        source: source.to_string(),
        register_number: decode_ascii(field(line, REGISTER)),
        name_kanji: normalize_name(&decode_cp932(field(line, NAME_KANJI))),
        name_kana: decode_cp932(field(line, NAME_KANA)).trim().to_string(),
        branch: decode_cp932(field(line, BRANCH))
            .replace('\u{3000}', "")
            .trim()
            .to_string(),
        grade: decode_ascii(field(line, GRADE)),
        profile_code: decode_ascii(field(line, PROFILE)),
        release_year: release.year,
        release_month: release.month,
        release_term: release.term.clone(),
        metrics_primary_raw,
        metrics_primary,
        grade_info,
        metrics_secondary_raw,
        metrics_secondary,
        metrics_secondary_suffix,
        birthplace,
        raw_line: decode_cp932(line),
        text: String::new(),
    };
    record.text = summary_text(&record);
    record
}

fn summary_text(record: &FanRecord) -> String {
    let format_metrics = |prefix: &str, values: &[String]| {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}{:02}:{}", prefix, i + 1, v))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut release = String::new();
    if let Some(year) = record.release_year {
        release.push_str(&format!("{}年", year));
    }
    if let Some(month) = record.release_month {
        release.push_str(&format!("{:02}月", month));
    }
    if let Some(term) = &record.release_term {
        release.push_str(term);
    }

    let mut text = format!(
        "登録番号:{} 氏名:{} (ﾌﾘｶﾞﾅ:{}) 支部:{} 級別:{} プロフィールコード:{} グレード情報:{}",
        record.register_number,
        record.name_kanji,
        record.name_kana,
        record.branch,
        record.grade,
        record.profile_code,
        record.grade_info
    );
    if !release.is_empty() {
        text.push_str(&format!(" リリース:{}", release));
    }
    text.push_str(&format!(
        " 主要指標[{}] 追加指標[{}",
        format_metrics("P", &record.metrics_primary_raw),
        format_metrics("S", &record.metrics_secondary_raw)
    ));
    if !record.metrics_secondary_suffix.is_empty() {
        text.push(' ');
        text.push_str(&record.metrics_secondary_suffix);
    }
    text.push_str(&format!("] 出身:{}", record.birthplace));
    text
}

/// Parse every non-empty line of a fan file
///
/// Release info comes from the file stem.
pub fn parse_file(path: &Path) -> Result<Vec<FanRecord>, ConvertError> {
    let bytes = fs::read(path).map_err(|source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let release = infer_release(&stem);

    Ok(bytes
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| parse_record(line, &stem, &release))
        .collect())
}

/// Write records as JSONL, creating parent directories
pub fn write_jsonl(records: &[FanRecord], path: &Path) -> Result<(), ConvertError> {
    let io_err = |source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let file = fs::File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n").map_err(io_err)?;
    }
    writer.flush().map_err(io_err)
}

/// Filter by release year and order by (year, month, register number)
///
/// Records without a release year are always kept.
pub fn select_combined(
    mut records: Vec<FanRecord>,
    min_year: Option<i32>,
    max_year: Option<i32>,
) -> Vec<FanRecord> {
    records.retain(|r| match r.release_year {
        Some(year) => {
            min_year.map_or(true, |min| year >= min) && max_year.map_or(true, |max| year <= max)
        }
        None => true,
    });
    records.sort_by(|a, b| {
        let key = |r: &FanRecord| {
            (
                r.release_year.unwrap_or(0),
                r.release_month.unwrap_or(0),
                r.register_number.parse::<u64>().ok(),
            )
        };
        key(a)
            .cmp(&key(b))
            .then_with(|| a.register_number.cmp(&b.register_number))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{KnowledgeIndex, Lookup};

    fn sjis(text: &str, width: usize) -> Vec<u8> {
        let (encoded, _, _) = SHIFT_JIS.encode(text);
        let mut bytes = encoded.into_owned();
        bytes.resize(width, b' ');
        bytes
    }

    fn sample_line(register: &str) -> Vec<u8> {
        let mut line = Vec::new();
        line.extend_from_slice(register.as_bytes());
        line.extend(sjis("峰　竜太", 16));
        line.extend(sjis("ﾐﾈ ﾘｭｳﾀ", 15));
        line.extend(sjis("佐賀", 4));
        line.extend_from_slice(b"A1");
        line.extend_from_slice(b"19850330M1234567A");
        let mut primary = String::new();
        for i in 0..25 {
            if i == 3 {
                primary.push_str("    ");
            } else {
                primary.push_str(&format!("{:04}", 800 + i));
            }
        }
        line.extend_from_slice(primary.as_bytes());
        line.extend_from_slice(b"SG01G10003");
        line.extend_from_slice(b"0650071000xx12");
        line.extend(sjis("佐賀", BIRTHPLACE_LEN));
        line
    }

    #[test]
    fn test_infer_release() {
        assert_eq!(
            infer_release("fan2404"),
            Release {
                year: Some(2024),
                month: Some(4),
                term: Some("前期".to_string()),
            }
        );
        assert_eq!(infer_release("fan2310").term.as_deref(), Some("後期"));
        assert_eq!(infer_release("racers"), Release::default());
    }

    #[test]
    fn test_parse_record() {
        let release = infer_release("fan2404");
        let record = parse_record(&sample_line("4320"), "fan2404", &release);

        assert_eq!(record.register_number, "4320");
        assert_eq!(record.name_kanji, "峰 竜太");
        assert_eq!(record.name_kana, "ﾐﾈ ﾘｭｳﾀ");
        assert_eq!(record.branch, "佐賀");
        assert_eq!(record.grade, "A1");
        assert_eq!(record.profile_code, "19850330M1234567A");
        assert_eq!(record.metrics_primary.len(), 25);
        assert_eq!(record.metrics_primary[0], Some(8.0));
        assert_eq!(record.metrics_primary[3], None);
        assert_eq!(record.metrics_primary_raw[3], "");
        assert_eq!(record.grade_info, "SG01G10003");
        assert_eq!(record.metrics_secondary, vec![Some(6.5), Some(7.1), None]);
        assert_eq!(record.metrics_secondary_raw[2], "00xx");
        assert_eq!(record.metrics_secondary_suffix, "12");
        assert_eq!(record.birthplace, "佐賀");
        assert_eq!(record.release_year, Some(2024));
        assert!(record.text.starts_with("登録番号:4320 氏名:峰 竜太"));
        assert!(record.text.contains(" リリース:2024年04月前期"));
        assert!(record.text.contains("P01:0800"));
        assert!(record.text.ends_with("12] 出身:佐賀"));
    }

    #[test]
    fn test_short_line_does_not_panic() {
        let record = parse_record(b"4320", "x", &Release::default());
        assert_eq!(record.register_number, "4320");
        assert!(record.metrics_primary.is_empty());
        assert!(record.metrics_secondary.is_empty());
    }

    #[test]
    fn test_file_round_trips_into_index() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fan2404.txt");
        let mut bytes = sample_line("4320");
        bytes.extend_from_slice(b"\r\n\r\n");
        bytes.extend(sample_line("4444"));
        bytes.extend_from_slice(b"\r\n");
        std::fs::write(&input, bytes).unwrap();

        let records = parse_file(&input).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].source, "fan2404");

        let output = dir.path().join("out").join("fan2404.jsonl");
        write_jsonl(&records, &output).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        let index = KnowledgeIndex::parse(&text, "converted");
        assert_eq!(index.len(), 2);
        let entry = index
            .find(Lookup {
                register_number: Some("4444"),
                name: None,
            })
            .unwrap();
        assert_eq!(entry.branch, "佐賀");
        assert_eq!(entry.metrics_primary.len(), 25);
        assert_eq!(entry.release_term.as_deref(), Some("前期"));
    }

    #[test]
    fn test_select_combined() {
        let make = |register: &str, stem: &str| {
            parse_record(&sample_line(register), stem, &infer_release(stem))
        };
        let records = vec![
            make("5000", "fan2410"),
            make("4000", "fan2410"),
            make("4444", "fan2204"),
            make("3000", "fan2004"),
            make("1234", "misc"),
        ];

        let selected = select_combined(records, Some(2022), Some(2024));
        let order: Vec<_> = selected.iter().map(|r| r.register_number.as_str()).collect();
        assert_eq!(order, vec!["1234", "4444", "4000", "5000"]);
    }
}
