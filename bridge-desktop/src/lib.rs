//! Desktop implementations of the host bridge traits.
//!
//! - [`ReqwestHttpClient`]: `HttpClient` over reqwest with retry on 5xx/429
//! - [`DesktopNetworkMonitor`]: `NetworkMonitor` backed by a timed TCP probe
//! - [`default_data_dir`]: per-user directory for the offline database

mod http;
mod network;

pub use http::ReqwestHttpClient;
pub use network::{DesktopNetworkMonitor, ProbeConfig};

use std::path::PathBuf;

/// Directory holding the offline database, e.g. `~/.local/share/setlist-offline`.
///
/// Falls back to the working directory when the platform reports no data dir.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("setlist-offline")
}
