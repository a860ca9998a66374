//! Session lifecycle and persistence engine for a single-player tabletop campaign.
//!
//! This crate provides:
//! - An in-memory ledger of recent play actions
//! - A durable session snapshot with autosave
//! - Location state kept in the front matter of narrative documents
//! - git-backed session commits and named save points
//! - Markdown session logs
//!
//! # Quick Start
//!
//! ```ignore
//! use campaign_core::{Campaign, CampaignConfig, LedgerAction};
//!
//! #[tokio::main]
//! async fn main() -> campaign_core::Result<()> {
//!     let campaign = Campaign::open(CampaignConfig::new("my-campaign")).await?;
//!
//!     campaign.start_session(None, "village", None).await;
//!     campaign
//!         .record_action(LedgerAction::new("Ask the innkeeper about wolves"))
//!         .await;
//!
//!     let close = campaign.end_session(Some("Quiet night")).await;
//!     println!("{}", close.data.map(|c| c.report.summary).unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod atomic;
pub mod campaign;
pub mod character;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod ledger;
pub mod location;
pub mod outcome;
pub mod session_log;
pub mod snapshot;
pub mod testing;

// Primary public API
pub use campaign::{Campaign, SessionClose};
pub use checkpoint::{CheckpointError, CheckpointLayer, SavePoint};
pub use config::CampaignConfig;
pub use error::{Error, Result};
pub use ledger::{LedgerAction, LedgerEntry, LedgerError, LedgerSummary, SessionLedger};
pub use location::{LocationState, LocationStateStore, LocationStateUpdate, StateError, StateWrite};
pub use outcome::Outcome;
pub use session_log::{LogError, SessionLogCompiler, SessionSummary};
pub use snapshot::{SessionEndReport, SessionError, SessionManager, SessionSnapshot};
pub use testing::{ScriptedRunner, TestCampaign};
