use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Timelike};
use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::analysis::record::AnalysisRecord;

const FILE_PREFIX: &str = "sequenzanalyse";
const SLUG_FALLBACK: &str = "kontext";

pub struct ExportOptions {
    /// Drop the per-round provider metadata before writing.
    pub strip_metadata: bool,
    /// Characters of the outer context used for the file-name slug.
    pub slug_len: usize,
    /// Fixed timestamp instead of the current local time.
    pub timestamp: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            strip_metadata: true,
            slug_len: 40,
            timestamp: None,
        }
    }
}

/// `Y-M-D-H-M-S` without zero padding, e.g. `2026-3-7-9-5-12`.
pub fn make_timestamp(now: DateTime<Local>) -> String {
    format!(
        "{}-{}-{}-{}-{}-{}",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Short file-system friendly slug from free text.
pub fn slugify_short(text: &str, max_len: usize) -> String {
    let head: String = text.chars().take(max_len).collect();
    let short = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if short.is_empty() {
        return SLUG_FALLBACK.to_string();
    }

    let composed: String = short.nfc().collect();
    let cleaned: String = composed
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect();

    let mut slug = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }

    let slug = slug.trim_matches(|c| matches!(c, ' ' | '.' | '-' | '_'));
    if slug.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        slug.to_string()
    }
}

pub fn export_file_name(outer_context: &str, slug_len: usize, timestamp: &str) -> String {
    format!(
        "{}--{}--{}.json",
        FILE_PREFIX,
        slugify_short(outer_context, slug_len),
        timestamp
    )
}

/// Write `record` as pretty UTF-8 JSON into `dir`. Returns the file path.
pub fn save_json(record: &AnalysisRecord, dir: &Path, opts: &ExportOptions) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export dir {}", dir.display()))?;

    let timestamp = opts
        .timestamp
        .clone()
        .unwrap_or_else(|| make_timestamp(Local::now()));
    let path = dir.join(export_file_name(
        &record.outer_context,
        opts.slug_len,
        &timestamp,
    ));

    let json = if opts.strip_metadata {
        serde_json::to_string_pretty(&record.without_metadata())
    } else {
        serde_json::to_string_pretty(record)
    }
    .context("Failed to serialize analysis")?;

    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), rounds = record.rounds.len(), "Analysis exported");
    Ok(path)
}

pub fn load_json(path: &Path) -> Result<AnalysisRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid analysis file {}", path.display()))
}
