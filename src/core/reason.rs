// src/core/reason.rs

//! Operator-supplied shutdown reasons.

use std::fs;
use std::path::Path;
use tracing::warn;

/// Reads and consumes the shutdown reason file.
///
/// Returns `fallback` if the file is absent, unreadable, or blank. Line
/// endings are normalised to `\n`, and a reason with more than one non-empty
/// line is prefixed with a newline so it starts on its own line in the
/// in-game announcement. The file is deleted whether or not it could be read.
pub fn read_shutdown_reason(path: Option<&Path>, fallback: &str) -> String {
    let Some(path) = path else {
        return fallback.to_string();
    };
    if !path.exists() {
        return fallback.to_string();
    }

    let read = fs::read_to_string(path);
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove shutdown reason file {}: {}", path.display(), e);
    }
    let contents = match read {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Failed to read shutdown reason file {}: {}", path.display(), e);
            return fallback.to_string();
        }
    };

    let lines: Vec<&str> = contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .collect();
    let non_empty = lines.iter().filter(|line| !line.is_empty()).count();

    let reason = lines.join("\n");
    match non_empty {
        0 => fallback.to_string(),
        1 => reason,
        _ if reason.starts_with('\n') => reason,
        _ => format!("\n{reason}"),
    }
}
