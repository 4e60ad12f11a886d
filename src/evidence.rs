//! Snapshot and summary persistence

use std::path::Path;

use crate::error::Result;
use crate::models::{RequestSnapshot, Summary};

/// Write one request/response snapshot as pretty JSON, creating parent
/// directories as needed.
pub fn write_snapshot(snapshot: &RequestSnapshot, path: &Path) -> Result<()> {
    write_pretty(snapshot, path)
}

/// Write the run summary as pretty JSON.
pub fn write_summary(summary: &Summary, path: &Path) -> Result<()> {
    write_pretty(summary, path)
}

fn write_pretty<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, payload)?;
    Ok(())
}

/// Filesystem-safe stem for snapshot filenames: alphanumerics, `-` and
/// `_` kept, everything else replaced, capped at 80 characters.
pub fn safe_stem(s: &str) -> String {
    let mut out = String::new();
    for ch in s.chars() {
        if out.len() >= 80 {
            break;
        }
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed.to_string()
    }
}
