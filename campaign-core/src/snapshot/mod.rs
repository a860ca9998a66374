//! Durable projection of the active play session.
//!
//! Exactly one snapshot file exists while a session is active; its presence on
//! disk is the "session active" flag, so the invariant survives process restarts.

mod autosave;
pub mod history;
pub mod manager;
pub mod merge;

pub use history::{SessionHistory, SessionHistoryEntry};
pub use manager::{SessionEndReport, SessionManager};

use crate::character::CharacterError;
use crate::location::StateError;
use crate::session_log::LogError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Maximum number of response-time samples kept in the snapshot.
pub const MAX_RESPONSE_SAMPLES: usize = 50;

/// Errors from session snapshot operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A session is already active ({0})")]
    AlreadyActive(PathBuf),

    #[error("No active session")]
    NoActiveSession,

    #[error("Cannot read character file {path}: {source}")]
    Character {
        path: PathBuf,
        #[source]
        source: CharacterError,
    },

    #[error("Update does not fit the snapshot shape: {0}")]
    InvalidUpdate(serde_json::Error),

    #[error("Cannot advance the calendar by {0} minutes")]
    CalendarOverflow(u64),

    #[error("Location error: {0}")]
    Location(#[from] StateError),

    #[error("Session log error: {0}")]
    Log(#[from] LogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The authoritative record of one play session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub character: CharacterRef,
    pub location: LocationTrail,
    #[serde(default)]
    pub npcs: NpcLog,
    #[serde(default)]
    pub events: EventLog,
    #[serde(default)]
    pub calendar: SessionCalendar,
    #[serde(default)]
    pub performance: PerformanceCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRef {
    pub file_path: PathBuf,
    pub initial_level: u32,
    #[serde(rename = "initialXP")]
    pub initial_xp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationTrail {
    pub current_location_id: String,
    #[serde(default)]
    pub visited: Vec<LocationVisit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationVisit {
    pub location_id: String,
    pub entered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcLog {
    #[serde(default)]
    pub interacted_with: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLog {
    #[serde(default)]
    pub triggered_this_session: Vec<String>,
}

/// In-world date and time. Dates are free-form campaign strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionCalendar {
    pub start_date: String,
    pub start_time: String,
    pub current_date: String,
    pub current_time: String,
    pub elapsed_minutes: u64,
}

impl Default for SessionCalendar {
    fn default() -> Self {
        Self::starting_at("Day 1", "08:00")
    }
}

impl SessionCalendar {
    pub fn starting_at(date: impl Into<String>, time: impl Into<String>) -> Self {
        let date = date.into();
        let time = time.into();
        Self {
            start_date: date.clone(),
            start_time: time.clone(),
            current_date: date,
            current_time: time,
            elapsed_minutes: 0,
        }
    }

    /// Read the campaign calendar file, falling back to the default.
    pub async fn load(path: &Path) -> Self {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        let value: Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed calendar file, using default");
                return Self::default();
            }
        };

        let field = |keys: &[&str], fallback: &str| {
            keys.iter()
                .find_map(|k| value.get(*k).and_then(Value::as_str))
                .unwrap_or(fallback)
                .to_string()
        };
        Self::starting_at(
            field(&["current_date", "date"], "Day 1"),
            field(&["current_time", "time"], "08:00"),
        )
    }

    /// Calendar after `minutes` of in-world time. `Day N` dates roll over at midnight.
    ///
    /// Fails when the advance does not fit a time delta or the day counter.
    pub fn advanced(&self, minutes: u64) -> Result<Self, SessionError> {
        let overflow = || SessionError::CalendarOverflow(minutes);
        let delta = i64::try_from(minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(overflow)?;

        let mut next = self.clone();
        next.elapsed_minutes = self
            .elapsed_minutes
            .checked_add(minutes)
            .ok_or_else(overflow)?;

        if let Ok(time) = NaiveTime::parse_from_str(&self.current_time, "%H:%M") {
            let (time, overflow_secs) = time.overflowing_add_signed(delta);
            next.current_time = time.format("%H:%M").to_string();

            let days = overflow_secs / 86_400;
            if days > 0 {
                if let Some(day) = self
                    .current_date
                    .strip_prefix("Day ")
                    .and_then(|n| n.trim().parse::<i64>().ok())
                {
                    let day = day.checked_add(days).ok_or_else(overflow)?;
                    next.current_date = format!("Day {day}");
                }
            }
        }
        Ok(next)
    }
}

/// Advisory telemetry. Never used for control flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceCounters {
    pub startup_time_ms: u64,
    pub context_load_samples: Vec<u64>,
    pub average_response_ms: f64,
    pub autosave_count: u64,
}

impl SessionSnapshot {
    /// Calendar date embedded in the session id (`session-YYYY-MM-DD-NNN`).
    pub fn session_date(&self) -> Option<NaiveDate> {
        parse_session_id(&self.session_id).map(|(date, _)| date)
    }

    /// Distinct location ids visited this session, in first-visit order.
    pub fn distinct_locations(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for visit in &self.location.visited {
            if !seen.contains(&visit.location_id.as_str()) {
                seen.push(visit.location_id.as_str());
            }
        }
        if seen.is_empty() {
            seen.push(self.location.current_location_id.as_str());
        }
        seen
    }

    /// Interaction count per NPC.
    pub fn npc_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for npc in &self.npcs.interacted_with {
            *counts.entry(npc.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Build a session id for `date` and per-day `sequence`.
pub fn session_id_for(date: NaiveDate, sequence: u32) -> String {
    format!("session-{}-{sequence:03}", date.format("%Y-%m-%d"))
}

/// Split a session id into its date and sequence number.
pub fn parse_session_id(id: &str) -> Option<(NaiveDate, u32)> {
    let rest = id.strip_prefix("session-")?;
    let (date, sequence) = rest.rsplit_once('-')?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((date, sequence.parse().ok()?))
}
