//! # Audio Cache
//!
//! Keeps downloaded audio in the Local Store's binary table so a song played
//! once stays playable offline. Audio is fetched on demand per playback
//! request, never eagerly for a whole setlist.
//!
//! ```rust,ignore
//! use core_playback::cache::{AudioCacheGateway, CacheConfig};
//!
//! let gateway = AudioCacheGateway::new(CacheConfig::default(), store, http, network, clock);
//! match gateway.resolve_playable_url(&song).await {
//!     Ok(handle) => player.load(&handle.url, handle.bytes),
//!     Err(_) => player.skip(),
//! }
//! ```

pub mod config;
pub mod gateway;
pub mod stats;

pub use config::{CacheConfig, EvictionPolicy};
pub use gateway::{AudioCacheGateway, HandleSource, PlayableHandle};
pub use stats::CacheStats;
