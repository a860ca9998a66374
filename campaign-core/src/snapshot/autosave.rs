//! Periodic autosave of the active snapshot.
//!
//! Ticks go through the same lock as manual updates. A tick only writes if its
//! generation is still the installed one when it holds the lock, so a stop that
//! has returned can never be followed by a write, and a deleted snapshot is
//! never recreated.

use super::manager::SnapshotWriter;
use serde_json::json;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Handle to a running autosave loop.
#[derive(Debug)]
pub(crate) struct AutosaveTask {
    pub(crate) generation: u64,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AutosaveTask {
    /// Signal the loop and abort it. Must be called with the writer lock held.
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}

/// Spawn the autosave loop for `generation`.
pub(crate) fn spawn(
    writer: Weak<Mutex<SnapshotWriter>>,
    interval: Duration,
    generation: u64,
) -> AutosaveTask {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }

            if *shutdown_rx.borrow() {
                break;
            }

            // manager dropped
            let Some(writer) = writer.upgrade() else {
                break;
            };
            tick(&writer, generation).await;
        }
    });

    AutosaveTask {
        generation,
        shutdown,
        handle,
    }
}

/// One autosave. Returns whether the snapshot was written.
pub(crate) async fn tick(writer: &Mutex<SnapshotWriter>, generation: u64) -> bool {
    let writer = writer.lock().await;

    if writer.autosave_generation() != Some(generation) {
        tracing::debug!(generation, "stale autosave tick ignored");
        return false;
    }

    let result = writer
        .modify(|snapshot| {
            Ok(json!({
                "performance": {
                    "autosaveCount": snapshot.performance.autosave_count + 1
                }
            }))
        })
        .await;

    match result {
        Ok((_, snapshot)) => {
            tracing::debug!(
                session_id = %snapshot.session_id,
                autosave_count = snapshot.performance.autosave_count,
                "autosaved session"
            );
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "autosave skipped");
            false
        }
    }
}
