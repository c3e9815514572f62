//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use core_async::time::{sleep, timeout, Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// Where and how often the desktop monitor probes.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// `host:port` opened with a plain TCP connect.
    pub target: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: "1.1.1.1:443".to_string(),
            timeout: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Desktop network monitor.
///
/// Desktop hosts have no portable link-state API, so connectivity is inferred
/// from a TCP connect to [`ProbeConfig::target`]. The connect time doubles as
/// the round-trip estimate used for the slow-connection heuristic.
#[derive(Debug, Clone, Default)]
pub struct DesktopNetworkMonitor {
    config: ProbeConfig,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    async fn probe(&self) -> NetworkInfo {
        let started = Instant::now();
        match timeout(self.config.timeout, TcpStream::connect(&self.config.target)).await {
            Ok(Ok(_)) => {
                let rtt_ms = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
                NetworkInfo {
                    network_type: Some(NetworkType::Other),
                    ..NetworkInfo::connected()
                }
                .with_rtt_ms(rtt_ms)
            }
            Ok(Err(error)) => {
                debug!(target = %self.config.target, error = %error, "Network probe refused");
                NetworkInfo::disconnected()
            }
            Err(_) => {
                debug!(target = %self.config.target, "Network probe timed out");
                NetworkInfo {
                    status: NetworkStatus::Indeterminate,
                    ..NetworkInfo::disconnected()
                }
            }
        }
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let info = self.probe().await;
        debug!(status = ?info.status, rtt_ms = ?info.rtt_ms, "Network info updated");
        Ok(info)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            first: true,
        }))
    }
}

/// Polls the probe on an interval. The first observation is immediate.
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    first: bool,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        if !std::mem::take(&mut self.first) {
            sleep(self.monitor.config.poll_interval).await;
        }
        Some(self.monitor.probe().await)
    }
}
