//! # Offline Library
//!
//! Data model and durable storage for the offline setlist cache.
//!
//! - [`models`]: songs, setlists with tagged song/pause items, gigs, cached
//!   audio blobs and persisted sync bookkeeping
//! - [`remote`]: the contract of the authoritative content API
//! - [`db`]: SQLite pool and embedded migrations
//! - [`store`]: the Local Store with durable, in-memory and failover
//!   implementations

pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;

pub use error::{LibraryError, Result};
pub use models::{AudioBlob, AudioBlobMeta, Gig, PersistedSyncState, Setlist, SetlistItem, Song};
pub use remote::{RemoteDataSource, RemoteError, RemoteResult};
pub use store::{FailoverLocalStore, LocalStore, MemoryLocalStore, SqliteLocalStore};
