//! JSONL queue log validation.

use std::path::Path;

use ioqueue_core::structured_log::validate_log_file;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LogCheckReport {
    pub path: String,
    pub lines: usize,
    pub errors: Vec<String>,
}

impl LogCheckReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate every line of the log at `path`.
pub fn check_log(path: &Path) -> std::io::Result<LogCheckReport> {
    let (lines, errors) = validate_log_file(path)?;
    Ok(LogCheckReport {
        path: path.display().to_string(),
        lines,
        errors: errors.iter().map(ToString::to_string).collect(),
    })
}
