use intercept_dns_application::DiscoveryCallback;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Collects every hostname handed to the discovery callback.
#[derive(Default)]
pub struct CallbackProbe {
    seen: Mutex<Vec<String>>,
    notify: Notify,
}

impl CallbackProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn callback(self: &Arc<Self>) -> DiscoveryCallback {
        let probe = Arc::clone(self);
        Arc::new(move |hostname: &str| {
            probe.seen.lock().unwrap().push(hostname.to_string());
            probe.notify.notify_waiters();
        })
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Waits until at least `n` callbacks have run or the timeout elapses.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let count = self.count();
            if count >= n {
                return count;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count();
            }
        }
    }

    /// Gives the dispatch worker a chance to run anything still queued.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
