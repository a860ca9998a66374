//! git-backed checkpoint layer.

use super::runner::{CommandOutput, CommandRunner, ProcessRunner};
use super::{
    sanitize_save_name, truncate_summary, CheckpointError, SavePoint, SessionCommit,
    COMMIT_FOOTER, COMMIT_SUMMARY_WIDTH, SAVE_TAG_PREFIX,
};
use crate::config::CampaignConfig;
use crate::location::validate_location_id;
use crate::snapshot::SessionSnapshot;
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

lazy_static! {
    /// `[main 1a2b3c4] ...`, `[main (root-commit) 1a2b3c4] ...`, `[detached HEAD 1a2b3c4] ...`
    static ref COMMIT_LINE: Regex = Regex::new(r"^\[[^\]]*?\b([0-9a-f]{7,40})\]").unwrap();
}

/// Drives git for session commits and save points.
#[derive(Clone)]
pub struct CheckpointLayer {
    config: CampaignConfig,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for CheckpointLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointLayer")
            .field("root", &self.config.root)
            .field("program", &self.config.git_program)
            .finish_non_exhaustive()
    }
}

impl CheckpointLayer {
    /// Checkpoint layer running the real `git` binary.
    pub fn new(config: CampaignConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    /// Checkpoint layer with a substitute process runner.
    pub fn with_runner(config: CampaignConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    async fn git(&self, args: &[&str]) -> Result<CommandOutput, CheckpointError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner
            .run(&self.config.git_program, &args, &self.config.root)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CheckpointError::NotInstalled {
                        program: self.config.git_program.clone(),
                    }
                } else {
                    CheckpointError::Io(e)
                }
            })
    }

    async fn git_ok(&self, args: &[&str]) -> Result<CommandOutput, CheckpointError> {
        let output = self.git(args).await?;
        if !output.success {
            return Err(CheckpointError::CommandFailed {
                command: args.join(" "),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Verify git is installed and the campaign root is inside a repository.
    pub async fn check_available(&self) -> Result<(), CheckpointError> {
        let version = self.git(&["--version"]).await?;
        if !version.success {
            return Err(CheckpointError::NotInstalled {
                program: self.config.git_program.clone(),
            });
        }

        let inside = self.git(&["rev-parse", "--is-inside-work-tree"]).await?;
        if !inside.success || inside.stdout.trim() != "true" {
            return Err(CheckpointError::NotARepository(self.config.root.clone()));
        }
        Ok(())
    }

    /// Paths a session commit stages, whether or not they exist.
    pub fn session_paths(&self, snapshot: &SessionSnapshot, log_path: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = vec![
            snapshot.character.file_path.clone(),
            self.config.history_file(),
            self.config.calendar_file(),
        ];
        if let Some(log_path) = log_path {
            paths.push(log_path.to_path_buf());
        }
        for location in snapshot.distinct_locations() {
            if validate_location_id(location).is_ok() {
                paths.push(self.config.location_document_file(location));
            }
        }
        paths.dedup();
        paths
    }

    /// Stage the session's files and commit them.
    pub async fn commit_session(
        &self,
        snapshot: &SessionSnapshot,
        summary: &str,
        log_path: Option<&Path>,
    ) -> Result<SessionCommit, CheckpointError> {
        self.check_available().await?;

        let mut staged = Vec::new();
        for path in self.session_paths(snapshot, log_path) {
            if tokio::fs::metadata(&path).await.is_ok() {
                staged.push(self.relative(&path));
            }
        }
        if staged.is_empty() {
            return Err(CheckpointError::NothingToCommit);
        }

        let staged_args: Vec<String> = staged.iter().map(|p| p.display().to_string()).collect();
        let mut add_args = vec!["add", "--"];
        add_args.extend(staged_args.iter().map(String::as_str));
        self.git_ok(&add_args).await?;

        // exit 0 means the index matches HEAD
        let diff = self.git(&["diff", "--cached", "--quiet"]).await?;
        if diff.success {
            return Err(CheckpointError::NothingToCommit);
        }

        let message = build_commit_message(snapshot, summary);
        let output = self.git_ok(&["commit", "-m", &message]).await?;

        let short_id = match parse_commit_id(&output.stdout) {
            Some(id) => id,
            None => {
                tracing::debug!("commit id not found in git output, asking for HEAD");
                self.git_ok(&["rev-parse", "--short", "HEAD"])
                    .await?
                    .stdout
                    .trim()
                    .to_string()
            }
        };

        tracing::info!(session_id = %snapshot.session_id, commit = %short_id, "session committed");
        Ok(SessionCommit {
            short_id,
            message,
            staged,
        })
    }

    /// Whether `tag` exists.
    pub async fn tag_exists(&self, tag: &str) -> Result<bool, CheckpointError> {
        let output = self.git_ok(&["tag", "-l", tag]).await?;
        Ok(output.stdout.lines().any(|line| line.trim() == tag))
    }

    /// Create an annotated save point tag. Never overwrites an existing one.
    pub async fn create_save_point(
        &self,
        name: &str,
        description: &str,
    ) -> Result<SavePoint, CheckpointError> {
        self.check_available().await?;

        let sanitized = sanitize_save_name(name);
        if sanitized.is_empty() {
            return Err(CheckpointError::InvalidName(name.to_string()));
        }
        let tag = format!("{SAVE_TAG_PREFIX}{sanitized}");

        if self.tag_exists(&tag).await? {
            return Err(CheckpointError::SavePointExists(tag));
        }

        let description = if description.trim().is_empty() {
            sanitized.as_str()
        } else {
            description.trim()
        };
        self.git_ok(&["tag", "-a", &tag, "-m", description]).await?;

        tracing::info!(tag = %tag, "save point created");
        Ok(SavePoint {
            tag,
            description: description.to_string(),
            created_at: Some(chrono::Utc::now().fixed_offset()),
        })
    }

    /// All save points. Order is whatever git returns.
    pub async fn list_save_points(&self) -> Result<Vec<SavePoint>, CheckpointError> {
        self.check_available().await?;

        let pattern = format!("{SAVE_TAG_PREFIX}*");
        let output = self
            .git_ok(&[
                "tag",
                "-l",
                &pattern,
                "--format=%(refname:short)%00%(creatordate:iso-strict)%00%(contents:subject)",
            ])
            .await?;

        Ok(parse_save_points(&output.stdout))
    }

    /// Check out a save point. Uncommitted work is the caller's concern.
    ///
    /// Accepts either `save/<name>` or the bare name.
    pub async fn rollback_to_save(&self, tag: &str) -> Result<String, CheckpointError> {
        self.check_available().await?;

        let tag = if tag.starts_with(SAVE_TAG_PREFIX) {
            tag.to_string()
        } else {
            format!("{SAVE_TAG_PREFIX}{}", sanitize_save_name(tag))
        };

        let tag_ref = format!("refs/tags/{tag}");
        let verify = self.git(&["rev-parse", "-q", "--verify", &tag_ref]).await?;
        if !verify.success {
            return Err(CheckpointError::SavePointNotFound(tag));
        }

        self.git_ok(&["checkout", &tag]).await?;
        tracing::info!(tag = %tag, "rolled back to save point");
        Ok(tag)
    }

    /// Whether the working tree has changes a rollback would discard.
    pub async fn has_uncommitted_changes(&self) -> Result<bool, CheckpointError> {
        self.check_available().await?;
        let output = self.git_ok(&["status", "--porcelain"]).await?;
        Ok(!output.stdout.trim().is_empty())
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.config.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// `[SESSION] <date> | <location> | <summary>` plus session id and footer.
pub fn build_commit_message(snapshot: &SessionSnapshot, summary: &str) -> String {
    let summary = match truncate_summary(summary, COMMIT_SUMMARY_WIDTH) {
        s if s.is_empty() => "No summary".to_string(),
        s => s,
    };
    format!(
        "[SESSION] {} | {} | {}\n\nSession: {}\n\n{}",
        snapshot.start_time.format("%Y-%m-%d"),
        snapshot.location.current_location_id,
        summary,
        snapshot.session_id,
        COMMIT_FOOTER
    )
}

/// Short commit id from `git commit` output.
pub fn parse_commit_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| COMMIT_LINE.captures(line.trim()))
        .map(|caps| caps[1].to_string())
}

fn parse_save_points(stdout: &str) -> Vec<SavePoint> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.splitn(3, '\0');
            let tag = fields.next().unwrap_or_default().trim().to_string();
            let created_at = fields
                .next()
                .and_then(|d| DateTime::parse_from_rfc3339(d.trim()).ok());
            let description = fields.next().unwrap_or_default().trim().to_string();
            SavePoint {
                tag,
                description,
                created_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_snapshot, ScriptedRunner};

    fn layer(runner: &Arc<ScriptedRunner>) -> CheckpointLayer {
        CheckpointLayer::with_runner(CampaignConfig::new("/campaign"), runner.clone())
    }

    #[test]
    fn test_parse_commit_id() {
        assert_eq!(
            parse_commit_id("[main 1a2b3c4] [SESSION] 2026-10-19 | village | x\n 3 files changed"),
            Some("1a2b3c4".to_string())
        );
        assert_eq!(
            parse_commit_id("[main (root-commit) abcdef0] first"),
            Some("abcdef0".to_string())
        );
        assert_eq!(parse_commit_id("nothing here"), None);
    }

    #[test]
    fn test_commit_message_template() {
        let snapshot = sample_snapshot("village");
        let message = build_commit_message(&snapshot, &"x".repeat(80));
        let subject = message.lines().next().unwrap();

        assert!(subject.starts_with("[SESSION] "));
        assert!(subject.contains(" | village | "));
        assert!(subject.ends_with("..."));
        assert!(message.ends_with(COMMIT_FOOTER));
    }

    #[test]
    fn test_parse_save_points() {
        let stdout = "save/a\02026-10-19T10:00:00+00:00\0Before the ambush\nsave/b\0bad-date\0\n";
        let saves = parse_save_points(stdout);
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[0].description, "Before the ambush");
        assert!(saves[0].created_at.is_some());
        assert_eq!(saves[1].name(), "b");
        assert!(saves[1].created_at.is_none());
    }

    #[tokio::test]
    async fn test_check_available_not_installed() {
        let runner = Arc::new(ScriptedRunner::missing_program());
        let err = layer(&runner).check_available().await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotInstalled { .. }));
    }

    #[tokio::test]
    async fn test_check_available_not_a_repository() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(
            &["rev-parse", "--is-inside-work-tree"],
            CommandOutput::failed("fatal: not a git repository"),
        );
        let err = layer(&runner).check_available().await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotARepository(_)));
    }

    #[tokio::test]
    async fn test_create_save_point_refuses_overwrite() {
        let runner = Arc::new(ScriptedRunner::git_repository());
        runner.once(&["tag", "-l", "save/x"], CommandOutput::ok(""));
        runner.on(&["tag", "-l", "save/x"], CommandOutput::ok("save/x\n"));
        let layer = layer(&runner);

        let created = layer.create_save_point("x", "first").await.unwrap();
        assert_eq!(created.tag, "save/x");

        let err = layer.create_save_point("x", "second").await.unwrap_err();
        assert!(matches!(err, CheckpointError::SavePointExists(ref tag) if tag == "save/x"));

        // exactly one tag creation reached git
        let creations = runner
            .calls()
            .iter()
            .filter(|args| args.starts_with(&["tag".to_string(), "-a".to_string()]))
            .count();
        assert_eq!(creations, 1);
    }

    #[tokio::test]
    async fn test_create_save_point_sanitizes_name() {
        let runner = Arc::new(ScriptedRunner::git_repository());
        let save = layer(&runner)
            .create_save_point("Before the Dragon!", "")
            .await
            .unwrap();
        assert_eq!(save.tag, "save/Before-the-Dragon");
        assert_eq!(save.description, "Before-the-Dragon");
    }

    #[tokio::test]
    async fn test_create_save_point_rejects_empty_name() {
        let runner = Arc::new(ScriptedRunner::git_repository());
        let err = layer(&runner).create_save_point("???", "d").await.unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_rollback_missing_tag() {
        let runner = Arc::new(ScriptedRunner::git_repository());
        runner.on(
            &["rev-parse", "-q", "--verify", "refs/tags/save/nope"],
            CommandOutput::failed(""),
        );
        let err = layer(&runner).rollback_to_save("nope").await.unwrap_err();
        assert!(matches!(err, CheckpointError::SavePointNotFound(_)));
        assert!(!runner.calls().iter().any(|args| args[0] == "checkout"));
    }

    #[tokio::test]
    async fn test_rollback_checks_out_tag() {
        let runner = Arc::new(ScriptedRunner::git_repository());
        let tag = layer(&runner).rollback_to_save("save/camp").await.unwrap();
        assert_eq!(tag, "save/camp");
        assert!(runner
            .calls()
            .contains(&vec!["checkout".to_string(), "save/camp".to_string()]));
    }

    #[tokio::test]
    async fn test_commit_session_with_nothing_on_disk() {
        let runner = Arc::new(ScriptedRunner::git_repository());
        let snapshot = sample_snapshot("village");
        let err = layer(&runner)
            .commit_session(&snapshot, "Quiet night", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::NothingToCommit));
    }
}
