//! Change metrics: how many files and lines a change touches.

use crate::error::{CawsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size of a change as seen by the budget gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMetrics {
    pub files: u32,
    pub loc: u32,
}

impl ChangeMetrics {
    pub fn new(files: u32, loc: u32) -> Self {
        Self { files, loc }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    /// `None` for binary files.
    pub added: Option<u32>,
    pub removed: Option<u32>,
}

impl FileChange {
    /// A file git does not track yet, counted the way numstat counts a pure
    /// addition: every line added, NUL bytes mark it binary.
    pub fn untracked(path: impl Into<String>, contents: &[u8]) -> Self {
        let path = path.into();
        if contents.contains(&0) {
            return Self {
                path,
                added: None,
                removed: None,
            };
        }
        let mut lines = contents.iter().filter(|&&b| b == b'\n').count();
        if contents.last().is_some_and(|&b| b != b'\n') {
            lines += 1;
        }
        Self {
            path,
            added: Some(u32::try_from(lines).unwrap_or(u32::MAX)),
            removed: Some(0),
        }
    }

    pub fn lines(&self) -> u32 {
        self.added
            .unwrap_or(0)
            .saturating_add(self.removed.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub files: Vec<FileChange>,
}

impl ChangeSet {
    /// Parse `git diff --numstat -z --no-renames` output: NUL-terminated
    /// `<added>\t<removed>\t<path>` records with raw (unquoted) paths and `-`
    /// in both counts for binary files. A record with an empty path is the
    /// rename form, which this parser refuses.
    pub fn from_numstat(output: &str) -> Result<Self> {
        let mut files = Vec::new();
        for record in output.split('\0') {
            if record.is_empty() {
                continue;
            }
            let mut parts = record.splitn(3, '\t');
            let (Some(added), Some(removed), Some(path)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(CawsError::InvalidNumstat(record.to_string()));
            };
            if path.is_empty() {
                return Err(CawsError::InvalidNumstat(record.to_string()));
            }
            files.push(FileChange {
                path: path.to_string(),
                added: parse_count(added, record)?,
                removed: parse_count(removed, record)?,
            });
        }
        Ok(Self { files })
    }

    pub fn push(&mut self, change: FileChange) {
        self.files.push(change);
    }

    pub fn metrics(&self) -> ChangeMetrics {
        let files = u32::try_from(self.files.len()).unwrap_or(u32::MAX);
        let loc = self
            .files
            .iter()
            .fold(0u32, |acc, f| acc.saturating_add(f.lines()));
        ChangeMetrics { files, loc }
    }

    pub fn touches(&self, path: &Path) -> bool {
        self.files.iter().any(|f| Path::new(&f.path) == path)
    }
}

fn parse_count(field: &str, line: &str) -> Result<Option<u32>> {
    if field == "-" {
        return Ok(None);
    }
    field
        .parse::<u32>()
        .map(Some)
        .map_err(|_| CawsError::InvalidNumstat(line.to_string()))
}
