//! Campaign - the public API for session lifecycle and persistence.
//!
//! Wraps the ledger, snapshot manager, location state store, checkpoint layer
//! and log compiler behind one type. Every operation returns an [`Outcome`], so
//! command and UI layers need no per-component error handling.

use crate::checkpoint::{CheckpointLayer, SavePoint};
use crate::config::CampaignConfig;
use crate::ledger::{LedgerAction, LedgerEntry, LedgerError, LedgerSummary, SessionLedger};
use crate::location::{LocationState, LocationStateStore, LocationStateUpdate, StateWrite};
use crate::outcome::Outcome;
use crate::snapshot::{SessionEndReport, SessionHistoryEntry, SessionManager, SessionSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio::sync::Mutex;

/// Result of [`Campaign::end_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClose {
    #[serde(flatten)]
    pub report: SessionEndReport,
    /// In-memory ledger totals; `None` if the ledger was not running.
    pub ledger: Option<LedgerSummary>,
}

/// A campaign directory and its (at most one) active session.
pub struct Campaign {
    manager: SessionManager,
    ledger: Mutex<SessionLedger>,
}

impl Campaign {
    /// Campaign checkpointing through the real `git` binary.
    ///
    /// Fails if the config does not pass [`CampaignConfig::validate`].
    pub fn new(config: CampaignConfig) -> crate::Result<Self> {
        Ok(Self::from_manager(SessionManager::new(config)?))
    }

    /// Campaign with an explicit checkpoint layer.
    pub fn with_checkpoints(
        config: CampaignConfig,
        checkpoints: CheckpointLayer,
    ) -> crate::Result<Self> {
        Ok(Self::from_manager(SessionManager::with_checkpoints(
            config,
            checkpoints,
        )?))
    }

    fn from_manager(manager: SessionManager) -> Self {
        let ledger = SessionLedger::new(manager.config().ledger_capacity);
        Self {
            manager,
            ledger: Mutex::new(ledger),
        }
    }

    /// Open a campaign, resuming a session left on disk by an earlier process.
    pub async fn open(config: CampaignConfig) -> crate::Result<Self> {
        Ok(Self::new(config)?.resume().await)
    }

    /// [`Campaign::open`] with an explicit checkpoint layer.
    pub async fn open_with_checkpoints(
        config: CampaignConfig,
        checkpoints: CheckpointLayer,
    ) -> crate::Result<Self> {
        Ok(Self::with_checkpoints(config, checkpoints)?.resume().await)
    }

    async fn resume(self) -> Self {
        if let Some(snapshot) = self.manager.resume_session().await {
            let mut ledger = self.ledger.lock().await;
            if let Err(e) = ledger.start(snapshot.location.current_location_id.clone()) {
                tracing::warn!(error = %e, "ledger not restarted");
            }
        }
        self
    }

    pub fn config(&self) -> &CampaignConfig {
        self.manager.config()
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    fn store(&self) -> &LocationStateStore {
        self.manager.store()
    }

    fn checkpoints(&self) -> &CheckpointLayer {
        self.manager.checkpoints()
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start a session at `location_id`.
    ///
    /// `character` defaults to the configured character file.
    pub async fn start_session(
        &self,
        character: Option<&Path>,
        location_id: &str,
        xp_baseline: Option<u64>,
    ) -> Outcome<SessionSnapshot> {
        let character = character
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config().character_file());

        let snapshot = match self
            .manager
            .start_session(&character, location_id, xp_baseline)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => return Outcome::fail(e.to_string()),
        };

        let mut ledger = self.ledger.lock().await;
        if ledger.is_active() {
            // a ledger left over from a session closed by another process
            if let Err(e) = ledger.end() {
                tracing::warn!(error = %e, "stale ledger not closed");
            }
        }
        if let Err(e) = ledger.start(location_id) {
            return Outcome::fail(e.to_string());
        }
        Outcome::ok(snapshot)
    }

    /// Whether a session is active on disk.
    pub async fn is_active(&self) -> bool {
        self.manager.is_active().await
    }

    /// The active snapshot, if any.
    pub async fn current_session(&self) -> Outcome<Option<SessionSnapshot>> {
        Outcome::ok(self.manager.get_current_session().await)
    }

    /// Merge a partial snapshot.
    pub async fn update_session(&self, partial: Value) -> Outcome<SessionSnapshot> {
        self.manager.update_session(partial).await.into()
    }

    /// Close the active session.
    pub async fn end_session(&self, player_summary: Option<&str>) -> Outcome<SessionClose> {
        let report = match self.manager.end_session(player_summary).await {
            Ok(report) => report,
            Err(e) => return Outcome::fail(e.to_string()),
        };
        let ledger = self.ledger.lock().await.end().ok();
        Outcome::ok(SessionClose { report, ledger })
    }

    /// Stop autosave without ending the session.
    pub async fn stop_autosave(&self) -> Outcome<bool> {
        Outcome::ok(self.manager.stop_autosave().await)
    }

    /// Condensed records of finished sessions, oldest first.
    pub async fn history(&self) -> Outcome<Vec<SessionHistoryEntry>> {
        self.manager.history().entries().await.into()
    }

    // ========================================================================
    // Play actions
    // ========================================================================

    /// Record a play action. A location on the action also moves the snapshot.
    pub async fn record_action(&self, action: LedgerAction) -> Outcome<LedgerEntry> {
        let mut ledger = self.ledger.lock().await;
        if !ledger.is_active() {
            return Outcome::fail(LedgerError::NoActiveSession.to_string());
        }

        if let Some(location) = action.location_id.as_deref() {
            if ledger.current_location() != Some(location) {
                if let Err(e) = self.manager.enter_location(location).await {
                    return Outcome::fail(e.to_string());
                }
            }
        }
        ledger.record(action).into()
    }

    /// The last `count` recorded actions.
    pub async fn recent_actions(&self, count: usize) -> Outcome<Vec<LedgerEntry>> {
        let ledger = self.ledger.lock().await;
        if !ledger.is_active() {
            return Outcome::fail(LedgerError::NoActiveSession.to_string());
        }
        Outcome::ok(ledger.recent(count))
    }

    /// Recent actions as a text block for narration context.
    pub async fn action_context(&self, count: usize) -> Outcome<String> {
        let ledger = self.ledger.lock().await;
        if !ledger.is_active() {
            return Outcome::fail(LedgerError::NoActiveSession.to_string());
        }
        Outcome::ok(ledger.context(count))
    }

    /// Move to another location.
    pub async fn enter_location(&self, location_id: &str) -> Outcome<SessionSnapshot> {
        let snapshot = match self.manager.enter_location(location_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Outcome::fail(e.to_string()),
        };

        let mut ledger = self.ledger.lock().await;
        if ledger.is_active() && ledger.current_location() != Some(location_id) {
            if let Err(e) =
                ledger.record(LedgerAction::new(format!("Entered {location_id}")).at(location_id))
            {
                tracing::warn!(location_id, error = %e, "move not recorded in ledger");
            }
        }
        Outcome::ok(snapshot)
    }

    pub async fn record_npc_interaction(&self, npc_id: &str) -> Outcome<SessionSnapshot> {
        self.manager.record_npc_interaction(npc_id).await.into()
    }

    pub async fn record_event(&self, event_id: &str) -> Outcome<SessionSnapshot> {
        self.manager.record_event(event_id).await.into()
    }

    pub async fn record_response_time(&self, millis: u64) -> Outcome<SessionSnapshot> {
        self.manager.record_response_time(millis).await.into()
    }

    pub async fn advance_calendar(
        &self,
        minutes: u64,
        new_date: Option<&str>,
    ) -> Outcome<SessionSnapshot> {
        self.manager.advance_calendar(minutes, new_date).await.into()
    }

    // ========================================================================
    // Location state
    // ========================================================================

    /// Never fails; problems degrade to the default state.
    pub async fn load_location_state(&self, id: &str) -> Outcome<LocationState> {
        Outcome::ok(self.store().load_state(id).await)
    }

    pub async fn update_location_state(
        &self,
        id: &str,
        update: LocationStateUpdate,
    ) -> Outcome<LocationState> {
        self.store().update_state(id, update).await.into()
    }

    pub async fn mark_visited(&self, id: &str) -> Outcome<StateWrite> {
        self.store().mark_visited(id).await.into()
    }

    pub async fn add_discovered_item(&self, id: &str, item: &str) -> Outcome<StateWrite> {
        self.store().add_discovered_item(id, item).await.into()
    }

    pub async fn complete_event(&self, id: &str, event: &str) -> Outcome<StateWrite> {
        self.store().complete_event(id, event).await.into()
    }

    pub async fn update_npc_state(&self, id: &str, npc_id: &str, state: Value) -> Outcome<StateWrite> {
        self.store().update_npc_state(id, npc_id, state).await.into()
    }

    pub async fn set_custom_state(&self, id: &str, key: &str, value: Value) -> Outcome<StateWrite> {
        self.store().set_custom_state(id, key, value).await.into()
    }

    // ========================================================================
    // Save points
    // ========================================================================

    /// Whether checkpointing is possible in this campaign root.
    pub async fn check_checkpoints(&self) -> Outcome<()> {
        self.checkpoints().check_available().await.into()
    }

    pub async fn create_save_point(&self, name: &str, description: &str) -> Outcome<SavePoint> {
        self.checkpoints()
            .create_save_point(name, description)
            .await
            .into()
    }

    /// Save points, newest first. Undated ones sort last, by name.
    pub async fn list_save_points(&self) -> Outcome<Vec<SavePoint>> {
        let mut saves = match self.checkpoints().list_save_points().await {
            Ok(saves) => saves,
            Err(e) => return Outcome::fail(e.to_string()),
        };
        saves.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.tag.cmp(&b.tag))
        });
        Outcome::ok(saves)
    }

    /// Whether a rollback would discard uncommitted work.
    pub async fn has_uncommitted_changes(&self) -> Outcome<bool> {
        self.checkpoints().has_uncommitted_changes().await.into()
    }

    /// Check out a save point. Warning the player first is up to the caller.
    pub async fn rollback_to_save(&self, tag: &str) -> Outcome<String> {
        self.checkpoints().rollback_to_save(tag).await.into()
    }
}
