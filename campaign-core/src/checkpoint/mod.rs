//! Checkpoints: session commits and named save points in git.
//!
//! git is treated as an oracle for commit, tag and checkout semantics. This
//! layer only formats messages and tag names and sanitizes input.

pub mod layer;
pub mod runner;

pub use layer::CheckpointLayer;
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Namespace for save point tags.
pub const SAVE_TAG_PREFIX: &str = "save/";

/// Width the player summary is cut to in commit subjects.
pub const COMMIT_SUMMARY_WIDTH: usize = 50;

/// Footer appended to every session commit.
pub const COMMIT_FOOTER: &str = "Checkpointed by campaign-session";

/// Errors from checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("{program} is not installed")]
    NotInstalled { program: String },

    #[error("{0} is not inside a git repository")]
    NotARepository(PathBuf),

    #[error("Save point already exists: {0}")]
    SavePointExists(String),

    #[error("Save point not found: {0}")]
    SavePointNotFound(String),

    #[error("Invalid save point name: {0:?}")]
    InvalidName(String),

    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("`git {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A named, annotated tag under [`SAVE_TAG_PREFIX`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavePoint {
    /// Full tag name, e.g. `save/before-the-dragon`.
    pub tag: String,
    pub description: String,
    pub created_at: Option<DateTime<FixedOffset>>,
}

impl SavePoint {
    /// Name without the namespace prefix.
    pub fn name(&self) -> &str {
        self.tag.strip_prefix(SAVE_TAG_PREFIX).unwrap_or(&self.tag)
    }
}

/// A commit made for a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCommit {
    pub short_id: String,
    pub message: String,
    pub staged: Vec<PathBuf>,
}

/// Reduce a save point name to `[A-Za-z0-9_-]`.
///
/// Other characters become `-`; leading and trailing `-` are dropped.
pub fn sanitize_save_name(name: &str) -> String {
    let mapped: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches('-').to_string()
}

/// Cut `text` to `width` characters, marking the cut with `...`.
pub fn truncate_summary(text: &str, width: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= width {
        first_line.to_string()
    } else {
        let kept: String = first_line.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_save_name() {
        assert_eq!(sanitize_save_name("Before the Dragon!"), "Before-the-Dragon");
        assert_eq!(sanitize_save_name("act_2-start"), "act_2-start");
        assert_eq!(sanitize_save_name("../../etc"), "etc");
        assert_eq!(sanitize_save_name("!!!"), "");
    }

    #[test]
    fn test_truncate_summary() {
        assert_eq!(truncate_summary("Quiet night", 50), "Quiet night");
        let long = "a".repeat(80);
        let cut = truncate_summary(&long, 50);
        assert_eq!(cut.chars().count(), 50);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_summary("first line\nsecond", 50), "first line");
    }

    #[test]
    fn test_save_point_name() {
        let save = SavePoint {
            tag: "save/boss-fight".to_string(),
            description: "Right before the boss".to_string(),
            created_at: None,
        };
        assert_eq!(save.name(), "boss-fight");
    }
}
