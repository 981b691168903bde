//! Action resolution and game state engine for Voidwalkers.
//!
//! This crate provides:
//! - A turn engine that validates, adjudicates, applies, narrates and
//!   persists every action as one atomic cycle
//! - Adapters for an untrusted rules oracle and an untrusted narrative
//!   oracle, each with a deterministic fallback
//! - Turn-based combat with initiative, rounds and encounter summaries
//! - Versioned save slots
//!
//! # Quick Start
//!
//! ```ignore
//! use voidwalkers_core::{FileSaveStore, GameSession, Oracles, SaveSlot, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new(SaveSlot::new("first-run")?).with_character_name("Ash");
//!     let saves = Arc::new(FileSaveStore::new("saves"));
//!
//!     let mut session = GameSession::create_or_load(config, &Oracles::from_env(), saves).await?;
//!     println!("{}", session.intro());
//!
//!     let response = session.act_text("explore").await?;
//!     println!("{}", response.narrative);
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod combat;
pub mod config;
pub mod dice;
pub mod engine;
pub mod oracle;
pub mod persist;
pub mod rules;
pub mod session;
pub mod store;
pub mod testing;
pub mod world;

// Primary public API
pub use action::{ActionIntent, ActionRequest, ActionTag};
pub use config::{DisclosurePolicy, EngineConfig};
pub use engine::{TurnEngine, TurnError, TurnOutcome, TurnPhase};
pub use oracle::{Narration, NarrationSource, OracleError, Oracles};
pub use persist::{FileSaveStore, SaveSlot, SaveStore};
pub use session::{GameSession, Response, SessionConfig, SessionError};
pub use testing::TestHarness;
pub use world::Archetype;
