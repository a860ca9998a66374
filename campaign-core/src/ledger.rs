//! Session ledger: the in-memory ring buffer of recent play actions.
//!
//! Used for fast narration-context assembly while a session is active. Nothing
//! here is persisted; a restarted process starts with an empty, inactive ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use uuid::Uuid;

use crate::config::DEFAULT_LEDGER_CAPACITY;

/// Default number of entries returned by [`SessionLedger::recent`].
pub const DEFAULT_RECENT_COUNT: usize = 5;

/// Errors from ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("A session is already active")]
    AlreadyActive,

    #[error("No active session")]
    NoActiveSession,
}

/// An action to record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerAction {
    pub description: String,
    /// Where the action happened. Moves the ledger's current location when set.
    pub location_id: Option<String>,
    /// Resolution or narration text, if any.
    pub result: Option<String>,
}

impl LedgerAction {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }
}

/// A recorded action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub location_id: String,
    pub description: String,
    pub result: Option<String>,
}

/// Summary returned when the ledger closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub duration_secs: i64,
    pub action_count: usize,
    pub locations_visited: usize,
}

#[derive(Debug)]
struct ActiveLedger {
    started_at: DateTime<Utc>,
    current_location: String,
    entries: VecDeque<LedgerEntry>,
    total_actions: usize,
    locations: BTreeSet<String>,
}

/// Bounded ring buffer of the most recent actions.
#[derive(Debug)]
pub struct SessionLedger {
    capacity: usize,
    active: Option<ActiveLedger>,
}

impl Default for SessionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

impl SessionLedger {
    /// Create an inactive ledger. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            active: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Current location, if a session is active.
    pub fn current_location(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.current_location.as_str())
    }

    /// Start a session at `location_id` with an empty buffer.
    pub fn start(&mut self, location_id: impl Into<String>) -> Result<(), LedgerError> {
        if self.active.is_some() {
            return Err(LedgerError::AlreadyActive);
        }

        let location_id = location_id.into();
        let mut locations = BTreeSet::new();
        locations.insert(location_id.clone());

        self.active = Some(ActiveLedger {
            started_at: Utc::now(),
            current_location: location_id,
            entries: VecDeque::with_capacity(self.capacity),
            total_actions: 0,
            locations,
        });
        Ok(())
    }

    /// Append an action, dropping the oldest entries beyond capacity.
    pub fn record(&mut self, action: LedgerAction) -> Result<LedgerEntry, LedgerError> {
        let capacity = self.capacity;
        let active = self.active.as_mut().ok_or(LedgerError::NoActiveSession)?;

        if let Some(location) = action.location_id {
            active.locations.insert(location.clone());
            active.current_location = location;
        }

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            location_id: active.current_location.clone(),
            description: action.description,
            result: action.result,
        };

        active.entries.push_back(entry.clone());
        active.total_actions += 1;
        while active.entries.len() > capacity {
            active.entries.pop_front();
        }

        Ok(entry)
    }

    /// The last `count` entries, oldest first. Empty when inactive.
    pub fn recent(&self, count: usize) -> Vec<LedgerEntry> {
        match &self.active {
            Some(active) => {
                let skip = active.entries.len().saturating_sub(count);
                active.entries.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Render recent entries as a compact block for narration context.
    pub fn context(&self, count: usize) -> String {
        let mut context = String::new();
        for entry in self.recent(count) {
            context.push_str(&format!("- [{}] {}", entry.location_id, entry.description));
            if let Some(result) = &entry.result {
                context.push_str(&format!(" -> {result}"));
            }
            context.push('\n');
        }
        context
    }

    /// Close the session and return its summary. The buffer is cleared.
    pub fn end(&mut self) -> Result<LedgerSummary, LedgerError> {
        let active = self.active.take().ok_or(LedgerError::NoActiveSession)?;
        Ok(LedgerSummary {
            duration_secs: (Utc::now() - active.started_at).num_seconds(),
            action_count: active.total_actions,
            locations_visited: active.locations.len(),
        })
    }
}
