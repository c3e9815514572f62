//! # Playback Support
//!
//! The audio side of the offline cache: resolving a song to playable bytes,
//! from the local cache when possible and from the network otherwise.

pub mod cache;
pub mod error;

pub use cache::{AudioCacheGateway, CacheConfig, CacheStats, EvictionPolicy, HandleSource, PlayableHandle};
pub use error::{AudioUnavailableReason, PlaybackError, Result};
