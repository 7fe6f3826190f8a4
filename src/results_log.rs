//! Append-only log of summarization results.
//!
//! One JSON object per line. Off unless `results_log.enabled` is set.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::summarizer::Summary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub timestamp: String,
    pub input_chars: usize,
    pub summary: String,
    pub keywords: String,
}

impl ResultRecord {
    pub fn new(input: &str, result: &Summary) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            input_chars: input.chars().count(),
            summary: result.summary.clone(),
            keywords: result.keywords.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record. Failures are logged, never returned.
    ///
    /// Blocking; async callers go through [`append_async`](Self::append_async).
    pub fn append(&self, record: &ResultRecord) {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("Failed to create results log dir: {e}");
                return;
            }
        }

        let mut line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize result record: {e}");
                return;
            }
        };
        line.push('\n');

        // One write per record so concurrent appends never interleave
        match fs::OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!("Failed to write result record: {e}");
                } else {
                    debug!("Saved result record to {}", self.path.display());
                }
            }
            Err(e) => warn!("Failed to open results log {}: {e}", self.path.display()),
        }
    }

    /// Append on the blocking pool.
    pub async fn append_async(&self, record: ResultRecord) {
        let log = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || log.append(&record)).await {
            warn!("Results log task failed: {e}");
        }
    }

    /// Read back every parseable record.
    #[cfg(test)]
    pub fn load(&self) -> Vec<ResultRecord> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}
