//! Rolling session history: one JSON line per finished session.
//!
//! The file is only ever opened in append mode, so earlier entries are never
//! rewritten.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use super::session_id_for;

/// Condensed, permanent record of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryEntry {
    pub session_id: String,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub locations_visited: usize,
    pub npcs_interacted: usize,
    pub xp_gained: i64,
}

/// Append-only history file.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    path: PathBuf,
}

impl SessionHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry.
    ///
    /// A last line without its newline is terminated first so the new entry
    /// starts on a line of its own.
    pub async fn append(&self, entry: &SessionHistoryEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut line = String::new();
        if file.metadata().await?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                line.push('\n');
            }
        }
        line.push_str(&serde_json::to_string(entry)?);
        line.push('\n');

        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// All readable entries, oldest first. Malformed lines are skipped.
    pub async fn entries(&self) -> std::io::Result<Vec<SessionHistoryEntry>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = index + 1, error = %e, "skipping malformed history entry");
                }
            }
        }
        Ok(entries)
    }

    /// The entry for `session_id`, searching from the newest.
    pub async fn find(&self, session_id: &str) -> std::io::Result<Option<SessionHistoryEntry>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .rev()
            .find(|e| e.session_id == session_id))
    }

    /// The next free per-day session id for `date`.
    pub async fn next_session_id(&self, date: NaiveDate) -> std::io::Result<String> {
        let prefix = format!("session-{}-", date.format("%Y-%m-%d"));
        let count = self
            .entries()
            .await?
            .iter()
            .filter(|e| e.session_id.starts_with(&prefix))
            .count();
        Ok(session_id_for(date, count as u32 + 1))
    }
}
