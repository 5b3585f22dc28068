//! Blame hunk payloads.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Author of the commit a hunk is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Author {
    pub name: String,
    pub email: String,
    /// Author date in the author's own timezone.
    pub date: DateTime<FixedOffset>,
}

/// One attributed line range of a file.
///
/// Lines are 1-based; `end_line` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Hunk {
    pub start_line: u32,
    pub end_line: u32,
    #[serde(rename = "CommitID")]
    pub commit_id: String,
    pub author: Author,
    /// First line of the commit message.
    pub message: String,
    /// Path of the file at the attributed commit (differs from the requested path
    /// across renames).
    pub filename: String,
}

impl Hunk {
    /// Number of lines covered by this hunk.
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line)
    }
}
