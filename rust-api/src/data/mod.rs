//! Knowledge data preparation

pub mod fan;

// Re-export commonly used types
pub use fan::{infer_release, parse_file, parse_record, select_combined, write_jsonl, ConvertError, FanRecord};
