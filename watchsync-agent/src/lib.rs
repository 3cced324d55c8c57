//! Watch-state sync agent.
//!
//! Keeps "watched/resume" state in step across the media players of one
//! household:
//! - Outbound event worker delivering local events with capped, jittered
//!   exponential backoff
//! - Capture and reconciliation of local library notifications, with
//!   one-shot suppression of self-inflicted echoes
//! - Remote queue consumer applying other devices' updates through tiered
//!   matching (exact path, external ids, rescan)
//! - Device bootstrap and agent lifecycle

pub mod agent;
pub mod backoff;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod notifications;
pub mod queue;
pub mod reconciler;
pub mod remote;
pub mod signal;
pub mod state;
pub mod types;
pub mod worker;

pub use agent::{Agent, AgentParts};
pub use config::AgentConfig;
pub use error::{SyncError, SyncResult};
pub use state::{ConnectionStatus, RuntimeState};
pub use types::*;
