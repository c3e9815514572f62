//! Network Monitoring Abstraction
//!
//! Raw connectivity signal from the host. The core never trusts this stream
//! directly; `core_runtime::network::NetworkStatusMonitor` dedupes it and
//! derives the online/slow snapshot consumers see.

use crate::{
    error::Result,
    platform::{PlatformSend, PlatformSendSync},
};

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Cellular,
    WiFi,
    Ethernet,
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// The host could not tell, e.g. a probe timed out.
    Indeterminate,
}

/// One observation of the host network.
///
/// `downlink_kbps` and `rtt_ms` are estimates; hosts that cannot measure them
/// leave them `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    pub is_metered: bool,
    pub downlink_kbps: Option<u32>,
    pub rtt_ms: Option<u32>,
}

impl NetworkInfo {
    pub fn connected() -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: None,
            is_metered: false,
            downlink_kbps: None,
            rtt_ms: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            ..Self::connected()
        }
    }

    pub fn with_downlink_kbps(mut self, kbps: u32) -> Self {
        self.downlink_kbps = Some(kbps);
        self
    }

    pub fn with_rtt_ms(mut self, rtt_ms: u32) -> Self {
        self.rtt_ms = Some(rtt_ms);
        self
    }
}

/// Host network probe.
///
/// # Platform Support
///
/// - **Desktop**: TCP reachability probe (`bridge-desktop`)
/// - **Web**: `navigator.onLine` plus the Network Information API
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait NetworkMonitor: PlatformSendSync {
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    async fn is_connected(&self) -> Result<bool> {
        let info = self.get_network_info().await?;
        Ok(info.status == NetworkStatus::Connected)
    }

    /// Stream of raw host observations. May repeat identical values.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait NetworkChangeStream: PlatformSend {
    /// Next observation, or `None` once the host stops reporting.
    async fn next(&mut self) -> Option<NetworkInfo>;
}
