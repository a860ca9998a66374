//! Campaign configuration.
//!
//! Every path the engine touches is derived from a single campaign root, so a
//! campaign directory can be moved or checked out elsewhere without edits.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default autosave interval (5 minutes).
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(300);

/// Default number of actions kept in the session ledger.
pub const DEFAULT_LEDGER_CAPACITY: usize = 10;

/// Configuration for a campaign directory.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    /// Campaign root directory. Also the working directory for git.
    pub root: PathBuf,

    /// Character file, relative to the root unless absolute.
    pub character: PathBuf,

    /// Snapshot file of the active session.
    pub snapshot: PathBuf,

    /// Append-only session history (JSON Lines).
    pub history: PathBuf,

    /// In-world calendar file.
    pub calendar: PathBuf,

    /// Directory holding one sub-directory per location.
    pub locations_dir: PathBuf,

    /// Name of the narrative document inside each location directory.
    pub location_document: String,

    /// Directory for session logs.
    pub logs_dir: PathBuf,

    /// How often the active snapshot is autosaved.
    pub autosave_interval: Duration,

    /// Ledger ring buffer capacity.
    pub ledger_capacity: usize,

    /// Version-control program to drive.
    pub git_program: String,
}

impl CampaignConfig {
    /// Create a config with the default layout under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            character: PathBuf::from("characters/player.json"),
            snapshot: PathBuf::from(".campaign/current-session.json"),
            history: PathBuf::from(".campaign/session-history.jsonl"),
            calendar: PathBuf::from("world/calendar.json"),
            locations_dir: PathBuf::from("world/locations"),
            location_document: "README.md".to_string(),
            logs_dir: PathBuf::from("sessions"),
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            git_program: "git".to_string(),
        }
    }

    /// Build a config from `CAMPAIGN_*` environment variables.
    ///
    /// `CAMPAIGN_ROOT` defaults to the current directory.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var("CAMPAIGN_ROOT").unwrap_or_else(|_| ".".to_string());
        let mut config = Self::new(root);

        if let Ok(character) = std::env::var("CAMPAIGN_CHARACTER") {
            config = config.with_character(character);
        }

        if let Ok(secs) = std::env::var("CAMPAIGN_AUTOSAVE_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| Error::Config(format!("CAMPAIGN_AUTOSAVE_SECS is not a number: {secs}")))?;
            config = config.with_autosave_interval(Duration::from_secs(secs));
        }

        if let Ok(capacity) = std::env::var("CAMPAIGN_LEDGER_CAPACITY") {
            let capacity: usize = capacity.parse().map_err(|_| {
                Error::Config(format!("CAMPAIGN_LEDGER_CAPACITY is not a number: {capacity}"))
            })?;
            config = config.with_ledger_capacity(capacity);
        }

        if let Ok(program) = std::env::var("CAMPAIGN_GIT") {
            config = config.with_git_program(program);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the character file.
    pub fn with_character(mut self, path: impl Into<PathBuf>) -> Self {
        self.character = path.into();
        self
    }

    /// Set the autosave interval.
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    /// Set the ledger capacity.
    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity;
        self
    }

    /// Set the version-control program.
    pub fn with_git_program(mut self, program: impl Into<String>) -> Self {
        self.git_program = program.into();
        self
    }

    /// Set the session log directory.
    pub fn with_logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = dir.into();
        self
    }

    /// Set the locations directory.
    pub fn with_locations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.locations_dir = dir.into();
        self
    }

    /// Check values that cannot be expressed in the type.
    pub fn validate(&self) -> Result<()> {
        if self.autosave_interval.is_zero() {
            return Err(Error::Config("autosave interval must be positive".to_string()));
        }
        if self.ledger_capacity == 0 {
            return Err(Error::Config("ledger capacity must be at least 1".to_string()));
        }
        if self.location_document.is_empty() {
            return Err(Error::Config("location document name is empty".to_string()));
        }
        Ok(())
    }

    /// Resolve `path` against the campaign root unless it is absolute.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn character_file(&self) -> PathBuf {
        self.resolve_path(&self.character)
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.resolve_path(&self.snapshot)
    }

    pub fn history_file(&self) -> PathBuf {
        self.resolve_path(&self.history)
    }

    pub fn calendar_file(&self) -> PathBuf {
        self.resolve_path(&self.calendar)
    }

    pub fn locations_root(&self) -> PathBuf {
        self.resolve_path(&self.locations_dir)
    }

    pub fn logs_root(&self) -> PathBuf {
        self.resolve_path(&self.logs_dir)
    }

    /// Directory backing a location. The id must already be validated.
    pub fn location_dir(&self, id: &str) -> PathBuf {
        self.locations_root().join(id)
    }

    /// Narrative document of a location. The id must already be validated.
    pub fn location_document_file(&self, id: &str) -> PathBuf {
        self.location_dir(id).join(&self.location_document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = CampaignConfig::new("/campaign");
        assert_eq!(
            config.snapshot_file(),
            PathBuf::from("/campaign/.campaign/current-session.json")
        );
        assert_eq!(
            config.location_document_file("village"),
            PathBuf::from("/campaign/world/locations/village/README.md")
        );
        assert_eq!(config.ledger_capacity, DEFAULT_LEDGER_CAPACITY);
    }

    #[test]
    fn test_absolute_character_path_is_kept() {
        let config = CampaignConfig::new("/campaign").with_character("/elsewhere/hero.json");
        assert_eq!(config.character_file(), PathBuf::from("/elsewhere/hero.json"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = CampaignConfig::new("/campaign").with_ledger_capacity(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = CampaignConfig::new("/campaign").with_autosave_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
