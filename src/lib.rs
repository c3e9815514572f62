//! Workspace facade crate.
//!
//! Host applications depend on `setlist-offline` and pick features instead of
//! wiring `core-service`, `core-playback` and the bridges by hand.

#[cfg(any(feature = "desktop-shims", feature = "audio-cache"))]
pub use core_service::*;

#[cfg(feature = "audio-cache")]
pub use core_playback::cache::{CacheConfig, CacheStats, EvictionPolicy, PlayableHandle};
