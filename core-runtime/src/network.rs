//! # Network Status Monitor
//!
//! Single source of truth for "can we reach the network" and "is the
//! connection poor". Raw host observations ([`NetworkInfo`]) are folded into a
//! [`NetworkSnapshot`]; subscribers hear about a new snapshot only when
//! `online` or `slow` actually changed, and a subscriber that falls behind
//! sees only the latest state.
//!
//! `slow` is advice. Nothing in the core waits on it.

use crate::events::{CoreEvent, EventBus, NetworkEvent};
use bridge_traits::network::{NetworkInfo, NetworkMonitor, NetworkStatus};
use core_async::sync::{watch, CancellationToken};
use core_async::task::JoinHandle;
use core_async::time::{timeout, Duration};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub online: bool,
    /// Always false while offline.
    pub slow: bool,
}

impl NetworkSnapshot {
    pub const OFFLINE: Self = Self {
        online: false,
        slow: false,
    };

    pub fn new(online: bool, slow: bool) -> Self {
        Self {
            online,
            slow: online && slow,
        }
    }

    pub fn quality(&self) -> ConnectionQuality {
        match (self.online, self.slow) {
            (false, _) => ConnectionQuality::Offline,
            (true, true) => ConnectionQuality::Slow,
            (true, false) => ConnectionQuality::Fast,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionQuality {
    Offline,
    Slow,
    Fast,
}

/// Thresholds for the slow-connection heuristic.
#[derive(Debug, Clone)]
pub struct NetworkMonitorConfig {
    /// Downlink estimates below this are slow.
    pub slow_bandwidth_kbps: u32,
    /// Round-trip estimates above this are slow.
    pub slow_rtt: Duration,
    /// Upper bound on a single host probe in [`NetworkStatusMonitor::refresh`].
    pub probe_timeout: Duration,
}

impl Default for NetworkMonitorConfig {
    fn default() -> Self {
        Self {
            slow_bandwidth_kbps: 1_000,
            slow_rtt: Duration::from_millis(800),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl NetworkMonitorConfig {
    pub fn with_slow_bandwidth_kbps(mut self, kbps: u32) -> Self {
        self.slow_bandwidth_kbps = kbps;
        self
    }

    pub fn with_slow_rtt(mut self, rtt: Duration) -> Self {
        self.slow_rtt = rtt;
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.probe_timeout.is_zero() {
            return Err("probe_timeout must be greater than zero".to_string());
        }
        if self.slow_rtt.is_zero() {
            return Err("slow_rtt must be greater than zero".to_string());
        }
        Ok(())
    }

    fn is_slow(&self, info: &NetworkInfo) -> bool {
        let low_bandwidth = info
            .downlink_kbps
            .is_some_and(|kbps| kbps < self.slow_bandwidth_kbps);
        let high_latency = info
            .rtt_ms
            .is_some_and(|rtt| u128::from(rtt) > self.slow_rtt.as_millis());
        low_bandwidth || high_latency
    }
}

pub struct NetworkStatusMonitor {
    config: NetworkMonitorConfig,
    state: watch::Sender<NetworkSnapshot>,
    event_bus: Option<EventBus>,
}

impl NetworkStatusMonitor {
    pub fn new(initial: NetworkSnapshot, config: NetworkMonitorConfig) -> Self {
        let (state, _) = watch::channel(NetworkSnapshot::new(initial.online, initial.slow));
        Self {
            config,
            state,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Pull accessor. Never blocks.
    pub fn current(&self) -> NetworkSnapshot {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().online
    }

    /// Latest-value receiver. Intermediate states between two reads coalesce.
    pub fn subscribe(&self) -> watch::Receiver<NetworkSnapshot> {
        self.state.subscribe()
    }

    /// Push subscription. The listener runs on a spawned task for each change
    /// after this call; dropping the handle or calling
    /// [`ListenerHandle::unsubscribe`] stops delivery.
    pub fn subscribe_with<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(NetworkSnapshot) + Send + Sync + 'static,
    {
        let mut rx = self.subscribe();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = core_async::task::spawn(async move {
            loop {
                core_async::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = *rx.borrow_and_update();
                        listener(snapshot);
                    }
                }
            }
        });

        ListenerHandle {
            token,
            task: Some(task),
        }
    }

    /// Fold one host observation into the snapshot. Returns true when the
    /// snapshot changed.
    ///
    /// `Indeterminate` keeps the previous `online` value and clears `slow`.
    pub fn report(&self, info: &NetworkInfo) -> bool {
        let online = match info.status {
            NetworkStatus::Connected => true,
            NetworkStatus::Disconnected => false,
            NetworkStatus::Indeterminate => self.current().online,
        };
        let slow = info.status == NetworkStatus::Connected && self.config.is_slow(info);
        self.apply(NetworkSnapshot::new(online, slow))
    }

    /// Host-level online/offline flip without a quality estimate.
    pub fn set_online(&self, online: bool) -> bool {
        let slow = online && self.current().slow;
        self.apply(NetworkSnapshot::new(online, slow))
    }

    fn apply(&self, next: NetworkSnapshot) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if changed {
            info!(online = next.online, slow = next.slow, "Network status changed");
            if let Some(bus) = &self.event_bus {
                bus.emit(CoreEvent::Network(NetworkEvent::StatusChanged {
                    online: next.online,
                    slow: next.slow,
                }))
                .ok();
            }
        }
        changed
    }

    /// Probe the host once, bounded by the configured timeout.
    pub async fn refresh(&self, bridge: &dyn NetworkMonitor) -> NetworkSnapshot {
        match timeout(self.config.probe_timeout, bridge.get_network_info()).await {
            Ok(Ok(info)) => {
                self.report(&info);
            }
            Ok(Err(error)) => {
                warn!(error = %error, "Network probe failed; keeping previous status");
                let online = self.current().online;
                self.apply(NetworkSnapshot::new(online, false));
            }
            Err(_) => {
                debug!("Network probe timed out; keeping previous status");
                let online = self.current().online;
                self.apply(NetworkSnapshot::new(online, false));
            }
        }
        self.current()
    }

    /// Forward the host change stream into this monitor until the handle is
    /// dropped or the stream ends.
    pub fn watch(self: &Arc<Self>, bridge: Arc<dyn NetworkMonitor>) -> WatchHandle {
        let monitor = Arc::clone(self);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = core_async::task::spawn(async move {
            let mut stream = match bridge.subscribe_changes().await {
                Ok(stream) => stream,
                Err(error) => {
                    warn!(error = %error, "Host network stream unavailable");
                    return;
                }
            };
            loop {
                core_async::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    next = stream.next() => match next {
                        Some(info) => {
                            monitor.report(&info);
                        }
                        None => break,
                    },
                }
            }
            debug!("Network watcher stopped");
        });

        WatchHandle {
            _guard: token.drop_guard(),
            task,
        }
    }
}

impl std::fmt::Debug for NetworkStatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStatusMonitor")
            .field("current", &self.current())
            .field("config", &self.config)
            .finish()
    }
}

/// Keeps a push subscription alive.
pub struct ListenerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop delivery and wait for the listener task to finish.
    pub async fn unsubscribe(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Keeps a host watcher alive; dropping it stops the watcher.
pub struct WatchHandle {
    _guard: core_async::sync::DropGuard,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
