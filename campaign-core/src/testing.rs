//! Testing utilities for the campaign engine.
//!
//! This module provides tools for integration testing:
//! - `ScriptedRunner` for checkpoint tests without touching a real repository
//! - `TestCampaign` for scenarios against a seeded campaign directory
//! - Assertion helpers for [`Outcome`] values

use crate::campaign::Campaign;
use crate::checkpoint::{CheckpointLayer, CommandOutput, CommandRunner};
use crate::config::CampaignConfig;
use crate::outcome::Outcome;
use crate::snapshot::{
    session_id_for, CharacterRef, EventLog, LocationTrail, LocationVisit, NpcLog,
    PerformanceCounters, SessionCalendar, SessionSnapshot,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Character sheet written by [`seed_campaign`]: level 3, 900 XP.
pub const SAMPLE_CHARACTER: &str = r#"{
  "version": 1,
  "character": {
    "name": "Test Hero",
    "level": 3,
    "experience": 900,
    "inventory": {
      "items": [
        { "name": "Longsword", "quantity": 1 },
        { "name": "Torch", "quantity": 3 }
      ]
    }
  }
}
"#;

#[derive(Debug, Default)]
struct Script {
    once: VecDeque<(Vec<String>, CommandOutput)>,
    rules: Vec<(Vec<String>, CommandOutput)>,
    calls: Vec<Vec<String>>,
    missing_program: bool,
}

/// A fake [`CommandRunner`] that replays canned outputs.
///
/// Calls are matched by argument prefix. One-shot responses are consulted
/// first, in the order they were queued; then persistent responses, newest
/// first. Anything unmatched succeeds with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
}

impl ScriptedRunner {
    /// A runner with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner that behaves like git inside a repository.
    pub fn git_repository() -> Self {
        let runner = Self::new();
        runner.on(&["--version"], CommandOutput::ok("git version 2.43.0\n"));
        runner.on(&["rev-parse", "--is-inside-work-tree"], CommandOutput::ok("true\n"));
        runner
    }

    /// A repository in which a commit succeeds with `short_id`.
    pub fn committing(short_id: &str) -> Self {
        let runner = Self::git_repository();
        runner.on(&["diff", "--cached", "--quiet"], CommandOutput::failed(""));
        runner.on(
            &["commit"],
            CommandOutput::ok(format!("[main {short_id}] session\n 3 files changed\n")),
        );
        runner
    }

    /// A runner whose program cannot be found.
    pub fn missing_program() -> Self {
        let runner = Self::new();
        runner.lock().missing_program = true;
        runner
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer every call starting with `prefix`.
    pub fn on(&self, prefix: &[&str], output: CommandOutput) {
        self.lock().rules.push((to_args(prefix), output));
    }

    /// Answer the next call starting with `prefix`, once.
    pub fn once(&self, prefix: &[&str], output: CommandOutput) {
        self.lock().once.push_back((to_args(prefix), output));
    }

    /// Arguments of every call so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.lock().calls.clone()
    }

    /// Whether any call started with `prefix`.
    pub fn called(&self, prefix: &[&str]) -> bool {
        let prefix = to_args(prefix);
        self.lock().calls.iter().any(|args| args.starts_with(&prefix))
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String], _cwd: &Path) -> io::Result<CommandOutput> {
        let mut script = self.lock();
        script.calls.push(args.to_vec());

        if script.missing_program {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{program}: command not found"),
            ));
        }

        if let Some(index) = script.once.iter().position(|(p, _)| args.starts_with(p)) {
            if let Some((_, output)) = script.once.remove(index) {
                return Ok(output);
            }
        }

        let output = script
            .rules
            .iter()
            .rev()
            .find(|(prefix, _)| args.starts_with(prefix))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }
}

/// Lay out a campaign under `root`: the sample character and one directory
/// (with a short narrative document) per location.
pub async fn seed_campaign(root: &Path, locations: &[&str]) -> io::Result<CampaignConfig> {
    let config = CampaignConfig::new(root);

    let character = config.character_file();
    if let Some(parent) = character.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&character, SAMPLE_CHARACTER).await?;

    for id in locations {
        tokio::fs::create_dir_all(config.location_dir(id)).await?;
        let document = config.location_document_file(id);
        if tokio::fs::metadata(&document).await.is_err() {
            tokio::fs::write(&document, format!("# {id}\n\nNothing much happens here.\n")).await?;
        }
    }
    Ok(config)
}

/// A snapshot at `location` that never touched disk.
pub fn sample_snapshot(location: &str) -> SessionSnapshot {
    let now = Utc::now();
    SessionSnapshot {
        session_id: session_id_for(now.date_naive(), 1),
        start_time: now,
        end_time: None,
        character: CharacterRef {
            file_path: PathBuf::from("/campaign/characters/player.json"),
            initial_level: 3,
            initial_xp: 900,
        },
        location: LocationTrail {
            current_location_id: location.to_string(),
            visited: vec![LocationVisit {
                location_id: location.to_string(),
                entered_at: now,
            }],
        },
        npcs: NpcLog::default(),
        events: EventLog::default(),
        calendar: SessionCalendar::default(),
        performance: PerformanceCounters::default(),
    }
}

/// A seeded campaign wired to a [`ScriptedRunner`].
pub struct TestCampaign {
    pub campaign: Campaign,
    pub runner: Arc<ScriptedRunner>,
    pub config: CampaignConfig,
}

impl TestCampaign {
    /// Locations created by [`TestCampaign::new`].
    pub const LOCATIONS: &'static [&'static str] = &["village", "forest", "loc-A"];

    /// Seed `root` and build a campaign whose runner acts like a git repository.
    pub async fn new(root: &Path) -> crate::Result<Self> {
        Self::with_runner(root, ScriptedRunner::git_repository()).await
    }

    /// Seed `root` with a custom runner.
    pub async fn with_runner(root: &Path, runner: ScriptedRunner) -> crate::Result<Self> {
        let config = seed_campaign(root, Self::LOCATIONS).await?;
        let runner = Arc::new(runner);
        let checkpoints = CheckpointLayer::with_runner(config.clone(), runner.clone());
        Ok(Self {
            campaign: Campaign::with_checkpoints(config.clone(), checkpoints)?,
            runner,
            config,
        })
    }

    /// Like [`TestCampaign::new`], but resume a session found on disk.
    pub async fn open(root: &Path) -> crate::Result<Self> {
        let config = seed_campaign(root, Self::LOCATIONS).await?;
        let runner = Arc::new(ScriptedRunner::git_repository());
        let checkpoints = CheckpointLayer::with_runner(config.clone(), runner.clone());
        Ok(Self {
            campaign: Campaign::open_with_checkpoints(config.clone(), checkpoints).await?,
            runner,
            config,
        })
    }

    /// Overwrite a location's narrative document.
    pub async fn write_location(&self, id: &str, content: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(self.config.location_dir(id)).await?;
        tokio::fs::write(self.config.location_document_file(id), content).await
    }

    /// Read a location's narrative document.
    pub async fn read_location(&self, id: &str) -> io::Result<String> {
        tokio::fs::read_to_string(self.config.location_document_file(id)).await
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert an outcome succeeded.
#[track_caller]
pub fn assert_succeeded<T>(outcome: &Outcome<T>) {
    assert!(
        outcome.success,
        "Expected success, got error: {}",
        outcome.error.as_deref().unwrap_or("<none>")
    );
}

/// Assert an outcome failed with an error mentioning `needle`.
#[track_caller]
pub fn assert_failed<T>(outcome: &Outcome<T>, needle: &str) {
    assert!(!outcome.success, "Expected failure mentioning '{needle}'");
    let error = outcome.error.as_deref().unwrap_or_default();
    assert!(
        error.contains(needle),
        "Expected error mentioning '{needle}', got '{error}'"
    );
}
