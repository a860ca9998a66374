//! Read-modify-write access to location state blocks.

use super::front_matter;
use super::{validate_location_id, LocationState, LocationStateUpdate, StateError};
use crate::atomic::write_atomic;
use crate::config::CampaignConfig;
use chrono::Utc;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

/// Whether a convenience wrapper had to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateWrite {
    Written,
    Unchanged,
}

/// Per-location state persisted inside narrative documents.
#[derive(Debug, Clone)]
pub struct LocationStateStore {
    locations_root: PathBuf,
    document_name: String,
}

impl LocationStateStore {
    pub fn new(locations_root: impl Into<PathBuf>, document_name: impl Into<String>) -> Self {
        Self {
            locations_root: locations_root.into(),
            document_name: document_name.into(),
        }
    }

    pub fn from_config(config: &CampaignConfig) -> Self {
        Self::new(config.locations_root(), config.location_document.clone())
    }

    fn location_dir(&self, id: &str) -> PathBuf {
        self.locations_root.join(id)
    }

    /// Path of a location's narrative document. Validates the id first.
    pub fn document_path(&self, id: &str) -> Result<PathBuf, StateError> {
        validate_location_id(id)?;
        Ok(self.location_dir(id).join(&self.document_name))
    }

    /// Load a location's state, falling back to the default on any problem.
    pub async fn load_state(&self, id: &str) -> LocationState {
        let path = match self.document_path(id) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(location_id = %id, error = %e, "rejected location id, using default state");
                return LocationState::default();
            }
        };

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(location_id = %id, "no location document, using default state");
                return LocationState::default();
            }
            Err(e) => {
                tracing::warn!(location_id = %id, error = %e, "unreadable location document, using default state");
                return LocationState::default();
            }
        };

        parse_state(id, front_matter::split(&content).front_matter)
    }

    /// Merge `update` into the stored state and rewrite the document.
    ///
    /// Only an invalid id or a missing location directory fail before I/O;
    /// a missing or corrupt metadata block is replaced by the default state.
    pub async fn update_state(
        &self,
        id: &str,
        update: LocationStateUpdate,
    ) -> Result<LocationState, StateError> {
        validate_location_id(id)?;

        let dir = self.location_dir(id);
        let is_dir = fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            return Err(StateError::MissingDirectory(dir));
        }
        let path = dir.join(&self.document_name);

        // An existing document that cannot be read is not overwritten; its prose would be lost.
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(StateError::Io(e)),
        };

        let document = front_matter::split(&content);
        let mut state = parse_state(id, document.front_matter);
        state.apply(update);
        state.last_updated = Some(Utc::now());

        let yaml = serde_yaml::to_string(&state)?;
        let output = front_matter::join(&yaml, document.body);
        write_atomic(&path, output.as_bytes()).await?;

        tracing::debug!(location_id = %id, "location state written");
        Ok(state)
    }

    /// Mark a location visited.
    pub async fn mark_visited(&self, id: &str) -> Result<StateWrite, StateError> {
        validate_location_id(id)?;
        if self.load_state(id).await.visited {
            return Ok(StateWrite::Unchanged);
        }
        self.update_state(id, LocationStateUpdate::visited(true))
            .await?;
        Ok(StateWrite::Written)
    }

    /// Add an item to the discovered set.
    pub async fn add_discovered_item(&self, id: &str, item: &str) -> Result<StateWrite, StateError> {
        validate_location_id(id)?;
        let mut items = self.load_state(id).await.discovered_items;
        if !items.insert(item.to_string()) {
            return Ok(StateWrite::Unchanged);
        }
        let update = LocationStateUpdate {
            discovered_items: Some(items),
            ..LocationStateUpdate::default()
        };
        self.update_state(id, update).await?;
        Ok(StateWrite::Written)
    }

    /// Add an event to the completed set.
    pub async fn complete_event(&self, id: &str, event: &str) -> Result<StateWrite, StateError> {
        validate_location_id(id)?;
        let mut events = self.load_state(id).await.completed_events;
        if !events.insert(event.to_string()) {
            return Ok(StateWrite::Unchanged);
        }
        let update = LocationStateUpdate {
            completed_events: Some(events),
            ..LocationStateUpdate::default()
        };
        self.update_state(id, update).await?;
        Ok(StateWrite::Written)
    }

    /// Set one NPC's state at this location.
    pub async fn update_npc_state(
        &self,
        id: &str,
        npc_id: &str,
        state: Value,
    ) -> Result<StateWrite, StateError> {
        validate_location_id(id)?;
        if self.load_state(id).await.npc_states.get(npc_id) == Some(&state) {
            return Ok(StateWrite::Unchanged);
        }
        self.update_state(id, LocationStateUpdate::npc_state(npc_id, state))
            .await?;
        Ok(StateWrite::Written)
    }

    /// Set one custom key.
    pub async fn set_custom_state(
        &self,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<StateWrite, StateError> {
        validate_location_id(id)?;
        if self.load_state(id).await.custom_state.get(key) == Some(&value) {
            return Ok(StateWrite::Unchanged);
        }
        self.update_state(id, LocationStateUpdate::custom_state(key, value))
            .await?;
        Ok(StateWrite::Written)
    }
}

fn parse_state(id: &str, front_matter: Option<&str>) -> LocationState {
    let Some(yaml) = front_matter else {
        return LocationState::default();
    };
    if yaml.trim().is_empty() {
        return LocationState::default();
    }
    match serde_yaml::from_str(yaml) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(location_id = %id, error = %e, "malformed location metadata, using default state");
            LocationState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const PROSE: &str = "# The Village\n\nSmoke rises from the chimneys.\n\n---\n\nThe well is dry.\n";

    fn store_with_location(id: &str, content: Option<&str>) -> (TempDir, LocationStateStore) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dir = temp_dir.path().join(id);
        std::fs::create_dir_all(&dir).expect("Create dir should succeed");
        if let Some(content) = content {
            std::fs::write(dir.join("README.md"), content).expect("Write should succeed");
        }
        let store = LocationStateStore::new(temp_dir.path(), "README.md");
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_load_missing_file_is_default() {
        let (_dir, store) = store_with_location("village", None);
        assert_eq!(store.load_state("village").await, LocationState::default());
    }

    #[tokio::test]
    async fn test_load_invalid_id_is_default() {
        let (_dir, store) = store_with_location("village", None);
        assert_eq!(store.load_state("../village").await, LocationState::default());
    }

    #[tokio::test]
    async fn test_load_malformed_block_is_default() {
        let (_dir, store) = store_with_location("village", Some("---\nvisited: [unclosed\n---\nProse\n"));
        assert_eq!(store.load_state("village").await, LocationState::default());
    }

    #[tokio::test]
    async fn test_update_preserves_prose_byte_for_byte() {
        let (dir, store) = store_with_location("village", Some(PROSE));

        store.mark_visited("village").await.unwrap();
        store.add_discovered_item("village", "lantern").await.unwrap();
        store
            .set_custom_state("village", "weather", json!("rain"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("village/README.md")).unwrap();
        let document = front_matter::split(&content);
        assert_eq!(document.body, PROSE);

        let state = store.load_state("village").await;
        assert!(state.visited);
        assert!(state.discovered_items.contains("lantern"));
        assert!(state.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_update_replaces_corrupt_block_but_keeps_prose() {
        let (dir, store) = store_with_location("village", Some("---\nvisited: [unclosed\n---\nProse stays.\n"));

        store
            .update_state("village", LocationStateUpdate::visited(true))
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("village/README.md")).unwrap();
        assert!(content.ends_with("---\nProse stays.\n"));
        assert!(store.load_state("village").await.visited);
    }

    #[tokio::test]
    async fn test_custom_state_merges_across_updates() {
        let (_dir, store) = store_with_location("loc-A", None);

        store
            .update_state("loc-A", LocationStateUpdate::custom_state("a", json!(1)))
            .await
            .unwrap();
        store
            .update_state("loc-A", LocationStateUpdate::custom_state("b", json!(2)))
            .await
            .unwrap();

        let state = store.load_state("loc-A").await;
        let expected = BTreeMap::from([("a".to_string(), json!(1)), ("b".to_string(), json!(2))]);
        assert_eq!(state.custom_state, expected);
    }

    #[tokio::test]
    async fn test_update_invalid_id_fails_without_io() {
        let (_dir, store) = store_with_location("village", None);
        let err = store
            .update_state("../../etc", LocationStateUpdate::visited(true))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_directory_fails() {
        let (_dir, store) = store_with_location("village", None);
        let err = store
            .update_state("castle", LocationStateUpdate::visited(true))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::MissingDirectory(_)));
    }

    #[tokio::test]
    async fn test_wrappers_are_idempotent() {
        let (dir, store) = store_with_location("village", Some(PROSE));
        let path = dir.path().join("village/README.md");

        assert_eq!(store.mark_visited("village").await.unwrap(), StateWrite::Written);
        assert_eq!(
            store.add_discovered_item("village", "sword").await.unwrap(),
            StateWrite::Written
        );
        assert_eq!(
            store.complete_event("village", "festival").await.unwrap(),
            StateWrite::Written
        );
        assert_eq!(
            store
                .update_npc_state("village", "mayor", json!({"mood": "grateful"}))
                .await
                .unwrap(),
            StateWrite::Written
        );
        let after_first = std::fs::read_to_string(&path).unwrap();

        assert_eq!(store.mark_visited("village").await.unwrap(), StateWrite::Unchanged);
        assert_eq!(
            store.add_discovered_item("village", "sword").await.unwrap(),
            StateWrite::Unchanged
        );
        assert_eq!(
            store.complete_event("village", "festival").await.unwrap(),
            StateWrite::Unchanged
        );
        assert_eq!(
            store
                .update_npc_state("village", "mayor", json!({"mood": "grateful"}))
                .await
                .unwrap(),
            StateWrite::Unchanged
        );

        // no write means last_updated did not move either
        assert_eq!(std::fs::read_to_string(&path).unwrap(), after_first);
        let state = store.load_state("village").await;
        assert_eq!(state.discovered_items.len(), 1);
        assert_eq!(state.completed_events.len(), 1);
    }
}
