//! # Core Runtime
//!
//! Infrastructure shared by every component of the offline core:
//! - [`config`]: `CoreConfig` builder and policy defaults
//! - [`logging`]: `tracing` subscriber setup and host log forwarding
//! - [`events`]: the broadcast `EventBus`
//! - [`network`]: the Network Status Monitor

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod network;

pub use error::{Error, Result};
pub use network::{ConnectionQuality, NetworkMonitorConfig, NetworkSnapshot, NetworkStatusMonitor};
