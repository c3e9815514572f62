//! Async runtime abstraction for the setlist offline core.
//!
//! Every `core-*`, `bridge-*` and `provider-*` crate goes through this crate
//! instead of naming tokio directly, so the host runtime can be swapped in one
//! place.
//!
//! - `task`: spawning detached work
//! - `time`: sleeping, timeouts, instants
//! - `sync`: locks, channels, cancellation
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.ok(), Some(42));
//! }
//! ```

pub mod sync;
pub mod task;
pub mod time;

pub use futures::future::{BoxFuture, FutureExt, Shared};
pub use task::spawn;
pub use tokio::select;
pub use time::{sleep, timeout, Duration, Instant};
