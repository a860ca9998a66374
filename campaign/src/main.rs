//! Headless driver for the campaign session engine.
//!
//! Reads line commands from stdin and prints results to stdout. Logs go to
//! stderr, filtered by `RUST_LOG` (default `info`).
//!
//! ```bash
//! cargo run -p campaign -- --root ./my-campaign --autosave-secs 60
//! ```

mod headless;

use anyhow::Context;
use campaign_core::{Campaign, CampaignConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command line options. Each one overrides its `CAMPAIGN_*` variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "campaign")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Campaign root directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Character file, relative to the campaign root
    #[arg(short, long)]
    pub character: Option<PathBuf>,

    /// Seconds between autosaves
    #[arg(long)]
    pub autosave_secs: Option<u64>,

    /// Number of recent actions kept in memory
    #[arg(long)]
    pub ledger_capacity: Option<usize>,

    /// git program to run for checkpoints
    #[arg(long)]
    pub git: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<CampaignConfig> {
        let mut config = CampaignConfig::from_env().context("invalid CAMPAIGN_* environment")?;

        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(character) = self.character {
            config = config.with_character(character);
        }
        if let Some(secs) = self.autosave_secs {
            config = config.with_autosave_interval(Duration::from_secs(secs));
        }
        if let Some(capacity) = self.ledger_capacity {
            config = config.with_ledger_capacity(capacity);
        }
        if let Some(git) = self.git {
            config = config.with_git_program(git);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Cli::parse().into_config()?;
    tracing::info!(root = %config.root.display(), "opening campaign");

    let campaign = Campaign::open(config).await?;
    headless::run(&campaign).await
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
