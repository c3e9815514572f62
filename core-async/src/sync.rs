//! Synchronization primitives.
//!
//! Async-aware locks and channels from tokio plus the cancellation token from
//! tokio-util. Locks held across `.await` must come from here, never from
//! `std::sync`.

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedMutexGuard, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
};
pub use tokio_util::sync::{CancellationToken, DropGuard};
