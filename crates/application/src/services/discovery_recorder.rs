use crate::ports::DiscoveryCallback;
use crate::services::ThrottledLogger;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use intercept_dns_domain::{DiscoveredHost, DiscoveryConfig};
use rustc_hash::FxHashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First observation; the discovery callback was queued.
    Discovered,
    /// Known hostname; counters and timestamps refreshed.
    Updated,
    /// Nothing to record (root query).
    Ignored,
}

/// Registry of every hostname the proxy has been asked about.
///
/// Entries are created once and never removed. Creation is a single
/// check-and-insert under the write lock, so concurrent first queries for the
/// same name produce exactly one entry and one callback.
pub struct DiscoveryRecorder {
    hosts: RwLock<FxHashMap<String, DiscoveredHost>>,
    config: DiscoveryConfig,
    notifier: ArcSwapOption<DiscoveryNotifier>,
    dropped_notifications: AtomicU64,
    throttle: Option<Arc<ThrottledLogger>>,
}

impl DiscoveryRecorder {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            hosts: RwLock::new(FxHashMap::default()),
            config,
            notifier: ArcSwapOption::empty(),
            dropped_notifications: AtomicU64::new(0),
            throttle: None,
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<ThrottledLogger>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Replaces the discovery callback. Notifications already queued for the
    /// previous callback are still delivered to it.
    pub fn set_callback(&self, callback: DiscoveryCallback) {
        let capacity = self.config.callback_queue_capacity.max(1);
        self.notifier
            .store(Some(Arc::new(DiscoveryNotifier::new(callback, capacity))));
    }

    /// Records one observed query for `hostname` (already normalized).
    pub async fn record(
        &self,
        hostname: &str,
        was_intercepted: bool,
        remote_addr: Option<SocketAddr>,
    ) -> RecordOutcome {
        let outcome = self.upsert(hostname, was_intercepted, remote_addr, Utc::now());

        if outcome == RecordOutcome::Discovered {
            info!(
                hostname = %hostname,
                intercepted = was_intercepted,
                "New hostname discovered"
            );
            self.notify(hostname).await;
        }

        outcome
    }

    fn upsert(
        &self,
        hostname: &str,
        was_intercepted: bool,
        remote_addr: Option<SocketAddr>,
        now: DateTime<Utc>,
    ) -> RecordOutcome {
        if hostname.is_empty() {
            return RecordOutcome::Ignored;
        }

        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());

        if let Some(host) = hosts.get_mut(hostname) {
            host.observe(was_intercepted, remote_addr, now);
            return RecordOutcome::Updated;
        }

        let is_known_service = self.config.is_known_service(hostname);
        hosts.insert(
            hostname.to_string(),
            DiscoveredHost::new(hostname, is_known_service, was_intercepted, remote_addr, now),
        );
        RecordOutcome::Discovered
    }

    async fn notify(&self, hostname: &str) {
        let Some(notifier) = self.notifier.load_full() else {
            return;
        };

        let timeout = Duration::from_millis(self.config.callback_send_timeout_ms);
        match notifier
            .sender()
            .send_timeout(hostname.to_string(), timeout)
            .await
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(dropped)) => {
                self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
                let message = format!(
                    "Discovery callback queue full, dropped notification for {}",
                    dropped
                );
                match &self.throttle {
                    Some(throttle) => {
                        throttle.log_keyed("discovery_queue_full", "", &message);
                    }
                    None => debug!("{}", message),
                }
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(hostname = %hostname, "Discovery callback worker is gone");
            }
        }
    }

    /// Copy of every discovered host, sorted by hostname.
    pub fn hosts(&self) -> Vec<DiscoveredHost> {
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshot: Vec<DiscoveredHost> = hosts.values().cloned().collect();
        snapshot.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        snapshot
    }

    /// Copy of the hosts flagged as first-party service hosts.
    pub fn known_service_hosts(&self) -> Vec<DiscoveredHost> {
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshot: Vec<DiscoveredHost> = hosts
            .values()
            .filter(|h| h.is_known_service)
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        snapshot
    }

    pub fn get(&self, hostname: &str) -> Option<DiscoveredHost> {
        self.hosts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(hostname)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.hosts.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifications dropped because the callback queue stayed full.
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for DiscoveryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryRecorder")
            .field("hosts", &self.len())
            .field("callback", &self.notifier.load().is_some())
            .finish()
    }
}

/// Bounded queue in front of one worker task that runs the callback.
///
/// The worker is spawned on first use, from inside `record`, so building a
/// recorder does not require a runtime.
struct DiscoveryNotifier {
    callback: DiscoveryCallback,
    capacity: usize,
    sender: OnceLock<mpsc::Sender<String>>,
}

impl DiscoveryNotifier {
    fn new(callback: DiscoveryCallback, capacity: usize) -> Self {
        Self {
            callback,
            capacity,
            sender: OnceLock::new(),
        }
    }

    fn sender(&self) -> &mpsc::Sender<String> {
        self.sender.get_or_init(|| {
            let (tx, rx) = mpsc::channel(self.capacity);
            tokio::spawn(run_callback_worker(rx, Arc::clone(&self.callback)));
            tx
        })
    }
}

async fn run_callback_worker(mut rx: mpsc::Receiver<String>, callback: DiscoveryCallback) {
    debug!("Discovery callback worker started");

    while let Some(hostname) = rx.recv().await {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| callback(&hostname)));
        if result.is_err() {
            error!(hostname = %hostname, "Discovery callback panicked");
        }
    }

    debug!("Discovery callback worker shutting down");
}
