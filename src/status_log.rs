//! Run status log - one line per run in a capped plain-text file
//!
//! Lines look like `[2024-03-01 12:30:00] [SUCCESS] Checked successfully - 2 new stars found`.
//! Once the file holds `max_lines` entries, the oldest ones are dropped before a new
//! line is appended.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome recorded for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
    max_lines: usize,
}

impl StatusLog {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            path: path.into(),
            max_lines: max_lines.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a timestamped entry, trimming the file to stay within the cap
    pub fn record(&self, status: Status, message: &str) -> Result<()> {
        let mut lines = self.read_lines()?;

        if lines.len() >= self.max_lines {
            let keep = self.max_lines - 1;
            lines.drain(..lines.len() - keep);
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        // Multi-line error chains stay on one line
        let message = message.replace('\n', " ");
        lines.push(format!("[{}] [{}] {}", timestamp, status.as_str(), message));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create status log directory")?;
            }
        }

        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write status log at {}", self.path.display()))?;

        debug!("Recorded {} in {}", status.as_str(), self.path.display());
        Ok(())
    }

    /// The last `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Result<Vec<String>> {
        let mut lines = self.read_lines()?;
        let skip = lines.len().saturating_sub(count);
        Ok(lines.split_off(skip))
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read status log at {}", self.path.display())),
        }
    }
}
