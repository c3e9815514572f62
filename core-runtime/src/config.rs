//! # Core Configuration Module
//!
//! [`CoreConfig`] gathers the policy constants and host bridges the offline
//! core needs. It is built once at startup with [`CoreConfig::builder`] and
//! then mapped onto the per-component configs (`SyncConfig`, `CacheConfig`,
//! `NetworkMonitorConfig`, `DatabaseConfig`) by the service crate.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .remote_base_url("https://content.example.com/api")
//!     .active_setlist_title("Friday rehearsal")
//!     .staleness_threshold(Duration::from_secs(4 * 3600))
//!     .build()?;
//! ```
//!
//! Without the `desktop-shims` feature the HTTP client and network monitor
//! must be injected; `build()` reports [`Error::CapabilityMissing`] otherwise.

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, NetworkMonitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_AUDIO_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_SLOW_BANDWIDTH_KBPS: u32 = 1_000;
pub const DEFAULT_SLOW_RTT: Duration = Duration::from_millis(800);
pub const DEFAULT_AUDIO_CACHE_MAX_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_AUDIO_FETCH_ATTEMPTS: u32 = 3;

/// Which cached audio goes first when the cache needs room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Oldest `last_accessed_at` first.
    #[default]
    LeastRecentlyUsed,
    /// Oldest `fetched_at` first.
    FirstInFirstOut,
    LargestFirst,
    /// Never evict automatically; writes that do not fit are served uncached.
    Manual,
}

#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite file. `None` keeps everything in memory for the session.
    pub database_path: Option<PathBuf>,
    pub remote_base_url: String,
    pub api_token: Option<String>,
    /// Setlist fetched by every sync.
    pub active_setlist_title: String,
    pub include_gigs: bool,
    pub staleness_threshold: Duration,
    pub metadata_timeout: Duration,
    pub audio_timeout: Duration,
    pub slow_bandwidth_kbps: u32,
    pub slow_rtt: Duration,
    pub audio_cache_max_bytes: u64,
    pub eviction_policy: EvictionPolicy,
    pub audio_fetch_attempts: u32,
    pub event_buffer: usize,
    pub http_client: Arc<dyn HttpClient>,
    pub network_monitor: Arc<dyn NetworkMonitor>,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("remote_base_url", &self.remote_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("active_setlist_title", &self.active_setlist_title)
            .field("include_gigs", &self.include_gigs)
            .field("staleness_threshold", &self.staleness_threshold)
            .field("metadata_timeout", &self.metadata_timeout)
            .field("audio_timeout", &self.audio_timeout)
            .field("slow_bandwidth_kbps", &self.slow_bandwidth_kbps)
            .field("slow_rtt", &self.slow_rtt)
            .field("audio_cache_max_bytes", &self.audio_cache_max_bytes)
            .field("eviction_policy", &self.eviction_policy)
            .field("audio_fetch_attempts", &self.audio_fetch_attempts)
            .field("event_buffer", &self.event_buffer)
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote_base_url.trim().is_empty() {
            return Err(Error::Config("Remote base URL cannot be empty".to_string()));
        }
        if self.active_setlist_title.trim().is_empty() {
            return Err(Error::Config(
                "Active setlist title cannot be empty".to_string(),
            ));
        }
        if self.staleness_threshold.is_zero() {
            return Err(Error::Config(
                "Staleness threshold must be greater than zero".to_string(),
            ));
        }
        if self.metadata_timeout.is_zero() || self.audio_timeout.is_zero() {
            return Err(Error::Config("Timeouts must be greater than zero".to_string()));
        }
        if self.audio_timeout < self.metadata_timeout {
            return Err(Error::Config(
                "Audio timeout must not be shorter than the metadata timeout".to_string(),
            ));
        }
        if self.audio_cache_max_bytes == 0 && self.eviction_policy != EvictionPolicy::Manual {
            return Err(Error::Config(
                "Audio cache size must be greater than zero unless eviction is manual"
                    .to_string(),
            ));
        }
        if self.audio_fetch_attempts == 0 {
            return Err(Error::Config(
                "Audio fetch attempts must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::Config("Event buffer must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    in_memory: bool,
    remote_base_url: Option<String>,
    api_token: Option<String>,
    active_setlist_title: Option<String>,
    include_gigs: bool,
    staleness_threshold: Option<Duration>,
    metadata_timeout: Option<Duration>,
    audio_timeout: Option<Duration>,
    slow_bandwidth_kbps: Option<u32>,
    slow_rtt: Option<Duration>,
    audio_cache_max_bytes: Option<u64>,
    eviction_policy: EvictionPolicy,
    audio_fetch_attempts: Option<u32>,
    event_buffer: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
}

impl CoreConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self.in_memory = false;
        self
    }

    /// Skip durable storage entirely.
    pub fn in_memory_store(mut self) -> Self {
        self.database_path = None;
        self.in_memory = true;
        self
    }

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.remote_base_url = Some(url.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn active_setlist_title(mut self, title: impl Into<String>) -> Self {
        self.active_setlist_title = Some(title.into());
        self
    }

    pub fn include_gigs(mut self, include: bool) -> Self {
        self.include_gigs = include;
        self
    }

    pub fn staleness_threshold(mut self, threshold: Duration) -> Self {
        self.staleness_threshold = Some(threshold);
        self
    }

    pub fn metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = Some(timeout);
        self
    }

    pub fn audio_timeout(mut self, timeout: Duration) -> Self {
        self.audio_timeout = Some(timeout);
        self
    }

    pub fn slow_bandwidth_kbps(mut self, kbps: u32) -> Self {
        self.slow_bandwidth_kbps = Some(kbps);
        self
    }

    pub fn slow_rtt(mut self, rtt: Duration) -> Self {
        self.slow_rtt = Some(rtt);
        self
    }

    pub fn audio_cache_max_bytes(mut self, bytes: u64) -> Self {
        self.audio_cache_max_bytes = Some(bytes);
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn audio_fetch_attempts(mut self, attempts: u32) -> Self {
        self.audio_fetch_attempts = Some(attempts);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        let remote_base_url = self.remote_base_url.ok_or_else(|| {
            Error::Config(
                "Remote base URL is required. Use .remote_base_url() to set it.".to_string(),
            )
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };
        let network_monitor = match self.network_monitor {
            Some(monitor) => monitor,
            None => provide_default_network_monitor()?,
        };

        let database_path = if self.in_memory {
            None
        } else {
            self.database_path.or_else(default_database_path)
        };

        let config = CoreConfig {
            database_path,
            remote_base_url,
            api_token: self.api_token,
            active_setlist_title: self
                .active_setlist_title
                .unwrap_or_else(|| "Rehearsal".to_string()),
            include_gigs: self.include_gigs,
            staleness_threshold: self
                .staleness_threshold
                .unwrap_or(DEFAULT_STALENESS_THRESHOLD),
            metadata_timeout: self.metadata_timeout.unwrap_or(DEFAULT_METADATA_TIMEOUT),
            audio_timeout: self.audio_timeout.unwrap_or(DEFAULT_AUDIO_TIMEOUT),
            slow_bandwidth_kbps: self
                .slow_bandwidth_kbps
                .unwrap_or(DEFAULT_SLOW_BANDWIDTH_KBPS),
            slow_rtt: self.slow_rtt.unwrap_or(DEFAULT_SLOW_RTT),
            audio_cache_max_bytes: self
                .audio_cache_max_bytes
                .unwrap_or(DEFAULT_AUDIO_CACHE_MAX_BYTES),
            eviction_policy: self.eviction_policy,
            audio_fetch_attempts: self
                .audio_fetch_attempts
                .unwrap_or(DEFAULT_AUDIO_FETCH_ATTEMPTS),
            event_buffer: self
                .event_buffer
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            network_monitor,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "An HttpClient is required to reach the content API and audio URLs. \
                  Enable the 'desktop-shims' feature or inject one with .http_client()."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Ok(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Err(Error::CapabilityMissing {
        capability: "NetworkMonitor".to_string(),
        message: "A NetworkMonitor is required to decide between online and offline paths. \
                  Enable the 'desktop-shims' feature or inject one with .network_monitor()."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn default_database_path() -> Option<PathBuf> {
    Some(bridge_desktop::default_data_dir().join("setlist.db"))
}

#[cfg(not(feature = "desktop-shims"))]
fn default_database_path() -> Option<PathBuf> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::network::{NetworkChangeStream, NetworkInfo};
    use bridge_traits::{HttpRequest, HttpResponse};

    struct NoopHttp;

    #[async_trait]
    impl HttpClient for NoopHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(204, ""))
        }
    }

    struct AlwaysOnline;

    #[async_trait]
    impl NetworkMonitor for AlwaysOnline {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(NetworkInfo::connected())
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            Err(bridge_traits::BridgeError::NotAvailable("no stream".to_string()))
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .remote_base_url("https://content.example.com/api")
            .http_client(Arc::new(NoopHttp))
            .network_monitor(Arc::new(AlwaysOnline))
    }

    #[test]
    fn test_defaults_are_applied() {
        let config = builder().in_memory_store().build().unwrap();
        assert_eq!(config.database_path, None);
        assert_eq!(config.staleness_threshold, DEFAULT_STALENESS_THRESHOLD);
        assert_eq!(config.metadata_timeout, DEFAULT_METADATA_TIMEOUT);
        assert_eq!(config.audio_timeout, DEFAULT_AUDIO_TIMEOUT);
        assert_eq!(config.eviction_policy, EvictionPolicy::LeastRecentlyUsed);
        assert_eq!(config.audio_fetch_attempts, 3);
        assert!(!config.include_gigs);
    }

    #[test]
    fn test_missing_base_url_is_rejected() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(NoopHttp))
            .network_monitor(Arc::new(AlwaysOnline))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_audio_timeout_shorter_than_metadata_is_rejected() {
        let result = builder()
            .metadata_timeout(Duration::from_secs(10))
            .audio_timeout(Duration::from_secs(5))
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Audio timeout")));
    }

    #[test]
    fn test_zero_cache_only_allowed_with_manual_eviction() {
        assert!(builder().audio_cache_max_bytes(0).build().is_err());
        assert!(builder()
            .audio_cache_max_bytes(0)
            .eviction_policy(EvictionPolicy::Manual)
            .build()
            .is_ok());
    }

    #[test]
    fn test_debug_output_redacts_token() {
        let config = builder().api_token("hunter2").build().unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_bridges_are_capability_errors() {
        let result = CoreConfig::builder()
            .remote_base_url("https://content.example.com/api")
            .build();
        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "HttpClient"
        ));
    }
}
