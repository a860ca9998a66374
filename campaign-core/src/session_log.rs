//! Session log compiler.
//!
//! Produces a markdown record of a finished session by comparing the snapshot's
//! baselines with a fresh read of the character file, rather than replaying
//! individual events.

use crate::character::CharacterProgress;
use crate::config::CampaignConfig;
use crate::snapshot::{parse_session_id, SessionSnapshot};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Text used when the player gave no summary.
pub const DEFAULT_PLAYER_SUMMARY: &str = "_No summary provided._";

/// Errors from session log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A rendered session summary plus the numbers it was built from.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub markdown: String,
    pub duration_minutes: i64,
    pub xp_gained: i64,
    pub current_level: u32,
    pub level_up: bool,
    /// The character file could not be read; progression is zeroed.
    pub character_fallback: bool,
}

/// Renders and stores session logs.
#[derive(Debug, Clone)]
pub struct SessionLogCompiler {
    logs_dir: PathBuf,
}

impl SessionLogCompiler {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    pub fn from_config(config: &CampaignConfig) -> Self {
        Self::new(config.logs_root())
    }

    /// Build the summary, re-reading the character file.
    pub async fn generate_summary(
        &self,
        snapshot: &SessionSnapshot,
        player_text: Option<&str>,
    ) -> SessionSummary {
        let character = match CharacterProgress::load(&snapshot.character.file_path).await {
            Ok(character) => Some(character),
            Err(e) => {
                tracing::warn!(
                    session_id = %snapshot.session_id,
                    path = %snapshot.character.file_path.display(),
                    error = %e,
                    "character file unreadable, progression will be zeroed"
                );
                None
            }
        };
        render_summary(snapshot, player_text, character.as_ref(), Utc::now())
    }

    /// Write a log for `session_id`, taking the first free per-day sequence slot.
    pub async fn save_log(&self, content: &str, session_id: &str) -> Result<PathBuf, LogError> {
        let (date, mut sequence) = parse_session_id(session_id)
            .unwrap_or_else(|| (Utc::now().date_naive(), 1));
        fs::create_dir_all(&self.logs_dir).await?;

        loop {
            let path = self
                .logs_dir
                .join(format!("{}-session-{sequence:02}.md", date.format("%Y-%m-%d")));

            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    file.sync_all().await?;
                    tracing::info!(session_id = %session_id, path = %path.display(), "session log written");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => sequence += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Render the markdown log.
///
/// The loot section lists the character's inventory as it is now, not the
/// difference from session start.
pub fn render_summary(
    snapshot: &SessionSnapshot,
    player_text: Option<&str>,
    character: Option<&CharacterProgress>,
    now: DateTime<Utc>,
) -> SessionSummary {
    let end = snapshot.end_time.unwrap_or(now);
    let duration_minutes = (end - snapshot.start_time).num_minutes().max(0);

    let (xp_gained, current_level) = match character {
        Some(c) => (
            c.experience as i64 - snapshot.character.initial_xp as i64,
            c.level,
        ),
        None => (0, snapshot.character.initial_level),
    };
    let level_up = current_level > snapshot.character.initial_level;

    let mut md = String::new();

    // header
    let _ = writeln!(md, "# Session Log: {}", snapshot.session_id);
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Date:** {}", snapshot.start_time.format("%Y-%m-%d"));
    let _ = writeln!(
        md,
        "- **Played:** {} to {} UTC ({})",
        snapshot.start_time.format("%H:%M"),
        end.format("%H:%M"),
        format_minutes(duration_minutes)
    );
    if let Some(name) = character.and_then(|c| c.name.as_deref()) {
        let _ = writeln!(md, "- **Character:** {name}");
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Summary");
    let _ = writeln!(md);
    match player_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => {
            let _ = writeln!(md, "{text}");
        }
        None => {
            let _ = writeln!(md, "{DEFAULT_PLAYER_SUMMARY}");
        }
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Locations");
    let _ = writeln!(md);
    if snapshot.location.visited.is_empty() {
        let _ = writeln!(md, "- {}", snapshot.location.current_location_id);
    } else {
        let _ = writeln!(md, "| # | Location | Entered |");
        let _ = writeln!(md, "|---|----------|---------|");
        for (i, visit) in snapshot.location.visited.iter().enumerate() {
            let _ = writeln!(
                md,
                "| {} | {} | {} |",
                i + 1,
                escape_cell(&visit.location_id),
                visit.entered_at.format("%H:%M")
            );
        }
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## NPC Interactions");
    let _ = writeln!(md);
    let npc_counts = snapshot.npc_counts();
    if npc_counts.is_empty() {
        let _ = writeln!(md, "_None._");
    } else {
        let _ = writeln!(md, "| NPC | Interactions |");
        let _ = writeln!(md, "|-----|--------------|");
        for (npc, count) in npc_counts {
            let _ = writeln!(md, "| {} | {count} |", escape_cell(npc));
        }
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Events");
    let _ = writeln!(md);
    write_list(&mut md, &snapshot.events.triggered_this_session);
    let _ = writeln!(md);

    let _ = writeln!(md, "## Loot");
    let _ = writeln!(md);
    match character {
        Some(c) => {
            let _ = writeln!(md, "Inventory at session end:");
            let _ = writeln!(md);
            write_list(&mut md, &c.inventory);
        }
        None => {
            let _ = writeln!(md, "_Character file unavailable._");
        }
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Progression");
    let _ = writeln!(md);
    let _ = writeln!(md, "- **XP gained:** {xp_gained:+}");
    let _ = writeln!(
        md,
        "- **Estimated total XP:** {}",
        snapshot.character.initial_xp as i64 + xp_gained
    );
    if level_up {
        let _ = writeln!(
            md,
            "- **Level:** {} -> {} (level up!)",
            snapshot.character.initial_level, current_level
        );
    } else {
        let _ = writeln!(md, "- **Level:** {current_level}");
    }
    if character.is_none() {
        let _ = writeln!(
            md,
            "- _The character file could not be read; progression shows no change._"
        );
    }
    let _ = writeln!(md);

    let calendar = &snapshot.calendar;
    let _ = writeln!(md, "## Calendar");
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Started:** {} {}", calendar.start_date, calendar.start_time);
    let _ = writeln!(md, "- **Now:** {} {}", calendar.current_date, calendar.current_time);
    let _ = writeln!(
        md,
        "- **In-world time elapsed:** {}",
        format_minutes(calendar.elapsed_minutes as i64)
    );
    let _ = writeln!(md);

    let perf = &snapshot.performance;
    let _ = writeln!(md, "## Performance");
    let _ = writeln!(md);
    let _ = writeln!(md, "- Startup: {} ms", perf.startup_time_ms);
    let _ = writeln!(
        md,
        "- Average response: {:.0} ms over {} samples",
        perf.average_response_ms,
        perf.context_load_samples.len()
    );
    let _ = writeln!(md, "- Autosaves: {}", perf.autosave_count);

    SessionSummary {
        markdown: md,
        duration_minutes,
        xp_gained,
        current_level,
        level_up,
        character_fallback: character.is_none(),
    }
}

fn write_list(md: &mut String, items: &[String]) {
    if items.is_empty() {
        let _ = writeln!(md, "_None._");
    }
    for item in items {
        let _ = writeln!(md, "- {item}");
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// `2h 05m`, or `45m` under an hour.
pub fn format_minutes(minutes: i64) -> String {
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}
