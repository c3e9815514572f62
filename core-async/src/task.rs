//! Task spawning.
//!
//! Detached work (background sync, audio fetches, network watchers) is started
//! through [`spawn`] so it survives the caller being dropped. The returned
//! [`JoinHandle`] can be awaited to observe the outcome.

pub use tokio::task::{yield_now, JoinError, JoinHandle};

/// Spawns a future onto the current runtime.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Spawns onto the current runtime if one is running on this thread.
///
/// Returns `None` outside a runtime, e.g. from a plain `#[test]` or a
/// subscriber callback on a foreign thread.
pub fn try_spawn<F>(future: F) -> Option<JoinHandle<F::Output>>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::runtime::Handle::try_current()
        .ok()
        .map(|handle| handle.spawn(future))
}
