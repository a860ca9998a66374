//! Session snapshot manager.
//!
//! Owns the active session's on-disk snapshot, schedules autosave, and runs
//! the end-of-session sequence: log, checkpoint, history, close.

use super::autosave::{self, AutosaveTask};
use super::history::{SessionHistory, SessionHistoryEntry};
use super::merge::deep_merge;
use super::{
    CharacterRef, EventLog, LocationTrail, LocationVisit, NpcLog, PerformanceCounters,
    SessionCalendar, SessionError, SessionSnapshot, MAX_RESPONSE_SAMPLES,
};
use crate::atomic::write_atomic;
use crate::character::CharacterProgress;
use crate::checkpoint::CheckpointLayer;
use crate::config::CampaignConfig;
use crate::location::{validate_location_id, LocationStateStore};
use crate::session_log::SessionLogCompiler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::sync::Mutex;

/// Result of closing a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndReport {
    pub session_id: String,
    /// Markdown session log.
    pub summary: String,
    pub log_path: PathBuf,
    /// Short id of the session commit; `None` when checkpointing failed or was skipped.
    pub commit: Option<String>,
    /// Why checkpointing did not happen.
    pub checkpoint_error: Option<String>,
    /// Progression in the log was built without the character file.
    pub character_fallback: bool,
    pub history: SessionHistoryEntry,
}

/// Single writer for the snapshot file.
///
/// Every read-modify-write of the snapshot, manual or autosave, happens while
/// holding the mutex around this value.
#[derive(Debug)]
pub(crate) struct SnapshotWriter {
    path: PathBuf,
    autosave: Option<AutosaveTask>,
    next_generation: u64,
}

impl SnapshotWriter {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            autosave: None,
            next_generation: 0,
        }
    }

    async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    pub(crate) async fn load(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&self.path, content.as_bytes()).await?;
        Ok(())
    }

    async fn delete(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Build a patch from the current snapshot, merge it and persist.
    ///
    /// Returns the snapshot before and after the merge.
    pub(crate) async fn modify<F>(
        &self,
        patch: F,
    ) -> Result<(SessionSnapshot, SessionSnapshot), SessionError>
    where
        F: FnOnce(&SessionSnapshot) -> Result<Value, SessionError>,
    {
        let before = self.load().await?.ok_or(SessionError::NoActiveSession)?;
        let patch = patch(&before)?;

        let mut merged = serde_json::to_value(&before)?;
        deep_merge(&mut merged, patch);
        let after: SessionSnapshot =
            serde_json::from_value(merged).map_err(SessionError::InvalidUpdate)?;

        self.save(&after).await?;
        Ok((before, after))
    }

    pub(crate) fn autosave_generation(&self) -> Option<u64> {
        self.autosave.as_ref().map(|task| task.generation)
    }

    fn start_autosave(&mut self, writer: &Arc<Mutex<SnapshotWriter>>, interval: std::time::Duration) {
        if self.autosave.is_some() {
            return;
        }
        self.next_generation += 1;
        self.autosave = Some(autosave::spawn(
            Arc::downgrade(writer),
            interval,
            self.next_generation,
        ));
    }

    fn stop_autosave(&mut self) -> bool {
        match self.autosave.take() {
            Some(task) => {
                task.stop();
                true
            }
            None => false,
        }
    }
}

/// Manages the single active session of a campaign.
pub struct SessionManager {
    config: CampaignConfig,
    store: LocationStateStore,
    compiler: SessionLogCompiler,
    checkpoints: CheckpointLayer,
    history: SessionHistory,
    writer: Arc<Mutex<SnapshotWriter>>,
    created_at: Instant,
}

impl SessionManager {
    /// Manager using the real git binary for checkpoints.
    pub fn new(config: CampaignConfig) -> crate::Result<Self> {
        let checkpoints = CheckpointLayer::new(config.clone());
        Self::with_checkpoints(config, checkpoints)
    }

    /// Manager with an explicit checkpoint layer. Fails on an invalid config.
    pub fn with_checkpoints(
        config: CampaignConfig,
        checkpoints: CheckpointLayer,
    ) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            store: LocationStateStore::from_config(&config),
            compiler: SessionLogCompiler::from_config(&config),
            history: SessionHistory::new(config.history_file()),
            writer: Arc::new(Mutex::new(SnapshotWriter::new(config.snapshot_file()))),
            checkpoints,
            config,
            created_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn store(&self) -> &LocationStateStore {
        &self.store
    }

    pub fn checkpoints(&self) -> &CheckpointLayer {
        &self.checkpoints
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Whether a snapshot file exists.
    pub async fn is_active(&self) -> bool {
        self.writer.lock().await.exists().await
    }

    /// Start a session. Fails if any snapshot file exists, without touching it.
    ///
    /// `xp_baseline` overrides the character file's experience as the session's
    /// starting XP.
    pub async fn start_session(
        &self,
        character_path: &Path,
        location_id: &str,
        xp_baseline: Option<u64>,
    ) -> Result<SessionSnapshot, SessionError> {
        validate_location_id(location_id)?;

        let mut writer = self.writer.lock().await;
        if writer.exists().await {
            return Err(SessionError::AlreadyActive(self.config.snapshot_file()));
        }

        let character_path = self.config.resolve_path(character_path);
        let progress = CharacterProgress::load(&character_path)
            .await
            .map_err(|source| SessionError::Character {
                path: character_path.clone(),
                source,
            })?;

        let now = Utc::now();
        let session_id = self.history.next_session_id(now.date_naive()).await?;
        let calendar = SessionCalendar::load(&self.config.calendar_file()).await;

        let snapshot = SessionSnapshot {
            session_id,
            start_time: now,
            end_time: None,
            character: CharacterRef {
                file_path: character_path,
                initial_level: progress.level,
                initial_xp: xp_baseline.unwrap_or(progress.experience),
            },
            location: LocationTrail {
                current_location_id: location_id.to_string(),
                visited: vec![LocationVisit {
                    location_id: location_id.to_string(),
                    entered_at: now,
                }],
            },
            npcs: NpcLog::default(),
            events: EventLog::default(),
            calendar,
            performance: PerformanceCounters {
                startup_time_ms: self.created_at.elapsed().as_millis() as u64,
                ..PerformanceCounters::default()
            },
        };

        writer.save(&snapshot).await?;
        writer.start_autosave(&self.writer, self.config.autosave_interval);
        drop(writer);

        tracing::info!(
            session_id = %snapshot.session_id,
            location_id = %location_id,
            "session started"
        );
        self.mark_visited(&snapshot.session_id, location_id).await;
        Ok(snapshot)
    }

    /// Pick up a snapshot left by an earlier process and restart autosave.
    pub async fn resume_session(&self) -> Option<SessionSnapshot> {
        let mut writer = self.writer.lock().await;
        let snapshot = match writer.load().await {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                tracing::warn!(error = %e, "cannot resume session");
                return None;
            }
        };
        writer.start_autosave(&self.writer, self.config.autosave_interval);
        tracing::info!(session_id = %snapshot.session_id, "session resumed");
        Some(snapshot)
    }

    /// The active snapshot, or `None`. Never fails.
    pub async fn get_current_session(&self) -> Option<SessionSnapshot> {
        match self.writer.lock().await.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable session snapshot");
                None
            }
        }
    }

    /// Recursively merge `partial` into the snapshot and persist it.
    ///
    /// Objects merge key-by-key; scalars and arrays replace.
    pub async fn update_session(&self, partial: Value) -> Result<SessionSnapshot, SessionError> {
        self.modify(|_| Ok(partial)).await
    }

    async fn modify<F>(&self, patch: F) -> Result<SessionSnapshot, SessionError>
    where
        F: FnOnce(&SessionSnapshot) -> Result<Value, SessionError>,
    {
        let (before, after) = self.writer.lock().await.modify(patch).await?;
        tracing::debug!(session_id = %after.session_id, "session snapshot updated");

        let location = &after.location.current_location_id;
        if *location != before.location.current_location_id {
            self.mark_visited(&after.session_id, location).await;
        }
        Ok(after)
    }

    /// Move to a location, appending a visit record.
    pub async fn enter_location(&self, location_id: &str) -> Result<SessionSnapshot, SessionError> {
        validate_location_id(location_id)?;
        self.modify(|snapshot| {
            if snapshot.location.current_location_id == location_id {
                return Ok(json!({}));
            }
            let mut visited = snapshot.location.visited.clone();
            visited.push(LocationVisit {
                location_id: location_id.to_string(),
                entered_at: Utc::now(),
            });
            Ok(json!({
                "location": {
                    "currentLocationId": location_id,
                    "visited": serde_json::to_value(visited)?,
                }
            }))
        })
        .await
    }

    /// Log an interaction with an NPC.
    pub async fn record_npc_interaction(&self, npc_id: &str) -> Result<SessionSnapshot, SessionError> {
        self.modify(|snapshot| {
            let mut npcs = snapshot.npcs.interacted_with.clone();
            npcs.push(npc_id.to_string());
            Ok(json!({ "npcs": { "interactedWith": npcs } }))
        })
        .await
    }

    /// Log a triggered event.
    pub async fn record_event(&self, event_id: &str) -> Result<SessionSnapshot, SessionError> {
        self.modify(|snapshot| {
            let mut events = snapshot.events.triggered_this_session.clone();
            events.push(event_id.to_string());
            Ok(json!({ "events": { "triggeredThisSession": events } }))
        })
        .await
    }

    /// Add a response-time sample and refresh the average.
    pub async fn record_response_time(&self, millis: u64) -> Result<SessionSnapshot, SessionError> {
        self.modify(|snapshot| {
            let mut samples = snapshot.performance.context_load_samples.clone();
            samples.push(millis);
            if samples.len() > MAX_RESPONSE_SAMPLES {
                samples.drain(..samples.len() - MAX_RESPONSE_SAMPLES);
            }
            let average = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
            Ok(json!({
                "performance": {
                    "contextLoadSamples": samples,
                    "averageResponseMs": average,
                }
            }))
        })
        .await
    }

    /// Advance in-world time, optionally jumping to a named date.
    pub async fn advance_calendar(
        &self,
        minutes: u64,
        new_date: Option<&str>,
    ) -> Result<SessionSnapshot, SessionError> {
        self.modify(|snapshot| {
            let mut calendar = snapshot.calendar.advanced(minutes)?;
            if let Some(date) = new_date {
                calendar.current_date = date.to_string();
            }
            Ok(json!({ "calendar": serde_json::to_value(calendar)? }))
        })
        .await
    }

    /// Start autosave for the active session. No-op if already running.
    pub async fn start_autosave(&self) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        if !writer.exists().await {
            return Err(SessionError::NoActiveSession);
        }
        writer.start_autosave(&self.writer, self.config.autosave_interval);
        Ok(())
    }

    /// Stop autosave. Once this returns no autosave tick will write.
    pub async fn stop_autosave(&self) -> bool {
        self.writer.lock().await.stop_autosave()
    }

    /// Whether an autosave loop is installed.
    pub async fn autosave_running(&self) -> bool {
        self.writer.lock().await.autosave.is_some()
    }

    /// Run one autosave tick now, as the timer would.
    pub async fn autosave_now(&self) -> bool {
        let generation = self.writer.lock().await.autosave_generation();
        match generation {
            Some(generation) => autosave::tick(&self.writer, generation).await,
            None => false,
        }
    }

    /// Close the session.
    ///
    /// Writes the session log, checkpoints (a checkpoint failure is reported in
    /// the result, not returned as an error), appends to the history and
    /// deletes the snapshot.
    pub async fn end_session(
        &self,
        player_summary: Option<&str>,
    ) -> Result<SessionEndReport, SessionError> {
        let mut writer = self.writer.lock().await;
        let mut snapshot = writer.load().await?.ok_or(SessionError::NoActiveSession)?;
        let ended_at: DateTime<Utc> = Utc::now();
        snapshot.end_time = Some(ended_at);

        let summary = self
            .compiler
            .generate_summary(&snapshot, player_summary)
            .await;
        let log_path = self
            .compiler
            .save_log(&summary.markdown, &snapshot.session_id)
            .await?;

        let (commit, checkpoint_error) = match self
            .checkpoints
            .commit_session(&snapshot, player_summary.unwrap_or_default(), Some(&log_path))
            .await
        {
            Ok(commit) => (Some(commit.short_id), None),
            Err(e) => {
                tracing::warn!(session_id = %snapshot.session_id, error = %e, "session not checkpointed");
                (None, Some(e.to_string()))
            }
        };

        let entry = SessionHistoryEntry {
            session_id: snapshot.session_id.clone(),
            ended_at,
            duration_minutes: summary.duration_minutes,
            locations_visited: snapshot.distinct_locations().len(),
            npcs_interacted: snapshot.npc_counts().len(),
            xp_gained: summary.xp_gained,
        };
        self.history.append(&entry).await?;

        writer.stop_autosave();
        writer.delete().await?;
        drop(writer);

        let history = match self.history.find(&snapshot.session_id).await {
            Ok(Some(recorded)) => recorded,
            _ => entry,
        };

        tracing::info!(
            session_id = %snapshot.session_id,
            log = %log_path.display(),
            committed = commit.is_some(),
            "session ended"
        );

        Ok(SessionEndReport {
            session_id: snapshot.session_id,
            summary: summary.markdown,
            log_path,
            commit,
            checkpoint_error,
            character_fallback: summary.character_fallback,
            history,
        })
    }

    async fn mark_visited(&self, session_id: &str, location_id: &str) {
        if let Err(e) = self.store.mark_visited(location_id).await {
            tracing::warn!(
                session_id = %session_id,
                location_id = %location_id,
                error = %e,
                "location state not updated"
            );
        }
    }
}
