use intercept_dns_domain::LoggingConfig;
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

const DEFAULT_WINDOW: Duration = Duration::from_secs(10);
const DEFAULT_MAX_KEYS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ThrottleKey {
    Message(String),
    Event { class: &'static str, subject: String },
}

/// Suppresses repeats of the same diagnostic within a time window.
///
/// The key map is bounded: once `max_keys` is reached, expired keys are swept;
/// if every key is still live the message is emitted untracked.
pub struct ThrottledLogger {
    window: Duration,
    max_keys: usize,
    last_emitted: Mutex<FxHashMap<ThrottleKey, Instant>>,
}

impl ThrottledLogger {
    pub fn new(window: Duration) -> Self {
        Self::with_capacity(window, DEFAULT_MAX_KEYS)
    }

    pub fn with_capacity(window: Duration, max_keys: usize) -> Self {
        Self {
            window,
            max_keys: max_keys.max(1),
            last_emitted: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::with_capacity(
            Duration::from_secs(config.throttle_window_secs),
            config.throttle_max_keys,
        )
    }

    /// Emits `message` unless the identical text went out within the window.
    /// Returns `true` when the line was emitted.
    pub fn log(&self, message: &str) -> bool {
        self.log_at(message, Instant::now())
    }

    /// Like [`log`](Self::log), but throttles on `(class, subject)` so messages
    /// carrying variable detail share one slot.
    pub fn log_keyed(&self, class: &'static str, subject: &str, message: &str) -> bool {
        let key = ThrottleKey::Event {
            class,
            subject: subject.to_string(),
        };
        self.emit_if_due(key, message, Instant::now())
    }

    pub(crate) fn log_at(&self, message: &str, now: Instant) -> bool {
        self.emit_if_due(ThrottleKey::Message(message.to_string()), message, now)
    }

    fn emit_if_due(&self, key: ThrottleKey, message: &str, now: Instant) -> bool {
        if !self.should_emit(key, now) {
            return false;
        }
        warn!(target: "intercept_dns::throttled", "{}", message);
        true
    }

    fn should_emit(&self, key: ThrottleKey, now: Instant) -> bool {
        let mut last_emitted = self.last_emitted.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(last) = last_emitted.get_mut(&key) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
            *last = now;
            return true;
        }

        if last_emitted.len() >= self.max_keys {
            let window = self.window;
            last_emitted.retain(|_, last| now.saturating_duration_since(*last) < window);
        }
        if last_emitted.len() < self.max_keys {
            last_emitted.insert(key, now);
        }
        true
    }

    /// Drops keys whose window has elapsed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.window;
        let mut last_emitted = self.last_emitted.lock().unwrap_or_else(|e| e.into_inner());
        let before = last_emitted.len();
        last_emitted.retain(|_, last| now.saturating_duration_since(*last) < window);
        before - last_emitted.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_emitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for ThrottledLogger {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl std::fmt::Debug for ThrottledLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledLogger")
            .field("window", &self.window)
            .field("max_keys", &self.max_keys)
            .field("tracked_keys", &self.tracked_keys())
            .finish()
    }
}
