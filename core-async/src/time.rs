//! Time utilities.
//!
//! Every network operation in the core is bounded with [`timeout`]; callers
//! never wait on an unbounded future.

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{error::Elapsed, interval, sleep, timeout, Instant, Interval};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timeout_elapses_on_slow_future() {
        let result = timeout(Duration::from_secs(2), sleep(Duration::from_secs(10))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn timeout_returns_value_when_fast() {
        let result = timeout(Duration::from_secs(2), async { 5 }).await;
        assert_eq!(result.unwrap(), 5);
    }
}
