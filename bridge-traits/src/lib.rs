//! # Host Bridge Traits
//!
//! Capabilities the offline core needs from its host, expressed as traits so
//! each platform can inject its own implementation:
//!
//! - [`HttpClient`]: remote content API and audio downloads
//! - [`NetworkMonitor`]: raw connectivity observations
//! - [`Clock`]: wall-clock time for staleness and cache timestamps
//! - [`LoggerSink`]: forwarding structured logs to the host
//!
//! Desktop implementations live in `bridge-desktop`.

pub mod error;
pub mod http;
pub mod network;
pub mod platform;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use platform::{PlatformSend, PlatformSendSync};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
