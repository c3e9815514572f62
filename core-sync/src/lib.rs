//! # Sync Engine
//!
//! Keeps the Local Store's replica of the catalog and the active setlist
//! fresh.
//!
//! - [`engine`]: the single-flight [`SyncEngine`] and its [`SyncConfig`]
//! - [`state`]: the observable [`SyncState`] and per-run [`SyncReport`]
//! - [`error`]: the failure taxonomy (`Offline`, `Timeout`, `ServerError`,
//!   `ParseError`, storage failures)

pub mod engine;
pub mod error;
pub mod state;

pub use engine::{validate_catalog, SyncConfig, SyncEngine};
pub use error::{Result, SyncError, SyncFailure, SyncFailureKind, SyncStage};
pub use state::{SyncOutcome, SyncReport, SyncState, SyncTrigger};
