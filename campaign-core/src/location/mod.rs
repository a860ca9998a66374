//! Location state: durable per-location flags and key/value state.
//!
//! State lives in a YAML metadata block at the top of each location's narrative
//! document (`world/locations/<id>/README.md`). The prose below the block is never
//! touched by state updates.

pub mod front_matter;
pub mod store;

pub use store::{LocationStateStore, StateWrite};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Errors from location state operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Invalid location id {id:?}: {reason}")]
    InvalidId { id: String, reason: &'static str },

    #[error("Location directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Durable state of one location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationState {
    pub visited: bool,
    pub discovered_items: BTreeSet<String>,
    pub completed_events: BTreeSet<String>,
    pub npc_states: BTreeMap<String, Value>,
    pub custom_state: BTreeMap<String, Value>,
    pub last_updated: Option<DateTime<Utc>>,

    /// Other metadata keys written by hand or by other tools; carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Partial changes for [`LocationStateStore::update_state`].
///
/// `npc_states` and `custom_state` are merged key-by-key into the stored maps;
/// every other supplied field replaces the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationStateUpdate {
    pub visited: Option<bool>,
    pub discovered_items: Option<BTreeSet<String>>,
    pub completed_events: Option<BTreeSet<String>>,
    pub npc_states: Option<BTreeMap<String, Value>>,
    pub custom_state: Option<BTreeMap<String, Value>>,
}

impl LocationStateUpdate {
    pub fn visited(visited: bool) -> Self {
        Self {
            visited: Some(visited),
            ..Self::default()
        }
    }

    pub fn discovered_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            discovered_items: Some(items.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn completed_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            completed_events: Some(events.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn npc_state(npc_id: impl Into<String>, state: Value) -> Self {
        Self {
            npc_states: Some(BTreeMap::from([(npc_id.into(), state)])),
            ..Self::default()
        }
    }

    pub fn custom_state(key: impl Into<String>, value: Value) -> Self {
        Self {
            custom_state: Some(BTreeMap::from([(key.into(), value)])),
            ..Self::default()
        }
    }
}

impl LocationState {
    /// Apply an update. `last_updated` is stamped by the caller.
    pub fn apply(&mut self, update: LocationStateUpdate) {
        if let Some(visited) = update.visited {
            self.visited = visited;
        }
        if let Some(items) = update.discovered_items {
            self.discovered_items = items;
        }
        if let Some(events) = update.completed_events {
            self.completed_events = events;
        }
        if let Some(npcs) = update.npc_states {
            self.npc_states.extend(npcs);
        }
        if let Some(custom) = update.custom_state {
            self.custom_state.extend(custom);
        }
    }
}

/// Reject ids that could escape the locations directory.
///
/// Runs before any path is built from the id.
pub fn validate_location_id(id: &str) -> Result<(), StateError> {
    let invalid = |reason| {
        Err(StateError::InvalidId {
            id: id.to_string(),
            reason,
        })
    };

    if id.trim().is_empty() {
        return invalid("empty id");
    }
    if id.contains('\0') {
        return invalid("contains NUL");
    }
    if id.contains('\\') {
        return invalid("contains a backslash");
    }
    if id.starts_with('/') || id.starts_with('~') {
        return invalid("absolute path");
    }
    let bytes = id.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return invalid("drive-letter path");
    }
    for segment in id.split('/') {
        if segment.is_empty() {
            return invalid("empty path segment");
        }
        if segment == ".." || segment == "." {
            return invalid("relative path segment");
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return invalid("only letters, digits, '-', '_' and '/' are allowed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_accepts_plain_and_nested_ids() {
        assert!(validate_location_id("village").is_ok());
        assert!(validate_location_id("loc-A").is_ok());
        assert!(validate_location_id("north_wood/old-mill").is_ok());
    }

    #[test]
    fn test_validate_rejects_traversal_and_absolute_forms() {
        for id in [
            "../secrets",
            "a/../../b",
            "..\\windows",
            "/etc/passwd",
            "~/notes",
            "C:\\campaign",
            "c:/campaign",
            "",
            "a//b",
            "a/./b",
            "name with spaces",
        ] {
            assert!(
                matches!(validate_location_id(id), Err(StateError::InvalidId { .. })),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_apply_merges_maps_and_replaces_sets() {
        let mut state = LocationState::default();
        state.discovered_items.insert("rope".to_string());
        state.custom_state.insert("a".to_string(), json!(1));

        let mut update = LocationStateUpdate::discovered_items(["sword"]);
        update.custom_state = Some(BTreeMap::from([("b".to_string(), json!(2))]));
        state.apply(update);

        assert_eq!(state.discovered_items, BTreeSet::from(["sword".to_string()]));
        assert_eq!(state.custom_state.get("a"), Some(&json!(1)));
        assert_eq!(state.custom_state.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_state_yaml_roundtrip_keeps_unknown_keys() {
        let yaml = "visited: true\ntitle: The Village\ndiscovered_items:\n- lantern\n";
        let state: LocationState = serde_yaml::from_str(yaml).unwrap();
        assert!(state.visited);
        assert_eq!(state.extra.get("title"), Some(&json!("The Village")));

        let written = serde_yaml::to_string(&state).unwrap();
        assert!(written.contains("title: The Village"));
    }
}
