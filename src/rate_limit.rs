//! Fixed-window rate limiting
//!
//! Process-local admission control keyed by arbitrary strings (client IP,
//! user ID, or composite keys). Counters live in a store guarded by a mutex
//! so tests can instantiate isolated stores and a shared backend can be
//! substituted later.
//!
//! This is deliberately a fixed-window counter, not a sliding window or token
//! bucket: a client can burst up to `2 * max_requests` across a window
//! boundary. That tradeoff is part of the contract and covered by tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Interval between garbage-collection sweeps of expired counters
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a rate-limit check. Never an error: a denied request is a
/// normal structured result, and callers translate it to HTTP 429.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Epoch millis at which the current window expires
    pub reset_at: i64,
    /// How long to wait before retrying; 0 when allowed
    pub retry_after_ms: i64,
}

#[derive(Debug)]
struct RateLimitEntry {
    count: u32,
    reset_at: i64,
}

/// Fixed-window counter store.
///
/// The only mutators are [`check_limit`](Self::check_limit) and the periodic
/// sweep; no other component reads or writes counters directly. Counters are
/// per process instance: horizontally scaled deployments get independent
/// counters, which is a documented limitation, not something to paper over
/// here.
#[derive(Debug, Default)]
pub struct RateLimitStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Check and count a request against the fixed window for `key`.
    ///
    /// Always returns immediately; a request over budget is denied, never
    /// queued.
    pub fn check_limit(&self, key: &str, max_requests: u32, window_ms: i64) -> RateLimitResult {
        self.check_limit_at(key, max_requests, window_ms, now_millis())
    }

    /// Clock-injected variant of [`check_limit`](Self::check_limit).
    ///
    /// The window is considered expired only when `now` is strictly greater
    /// than the entry's `reset_at`; a request arriving exactly at `reset_at`
    /// still counts against the old window.
    pub fn check_limit_at(
        &self,
        key: &str,
        max_requests: u32,
        window_ms: i64,
        now: i64,
    ) -> RateLimitResult {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match entries.get_mut(key) {
            Some(entry) if now <= entry.reset_at => {
                if entry.count >= max_requests {
                    debug!(key, count = entry.count, "rate limit exceeded");
                    return RateLimitResult {
                        allowed: false,
                        remaining: 0,
                        reset_at: entry.reset_at,
                        retry_after_ms: entry.reset_at - now,
                    };
                }
                entry.count += 1;
                RateLimitResult {
                    allowed: true,
                    remaining: max_requests - entry.count,
                    reset_at: entry.reset_at,
                    retry_after_ms: 0,
                }
            }
            _ => {
                // First request for this key, or the previous window expired.
                let reset_at = now + window_ms;
                entries.insert(key.to_string(), RateLimitEntry { count: 1, reset_at });
                RateLimitResult {
                    allowed: true,
                    remaining: max_requests.saturating_sub(1),
                    reset_at,
                    retry_after_ms: 0,
                }
            }
        }
    }

    /// Delete every entry whose window has already expired.
    ///
    /// Safe to run concurrently with `check_limit`: the next check on a
    /// deleted key simply recreates the entry as a fresh window.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(now_millis())
    }

    fn sweep_expired_at(&self, now: i64) -> usize {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.reset_at);
        before - entries.len()
    }

    /// Number of live counter entries (for tests and diagnostics)
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the periodic garbage-collection task for this store.
    ///
    /// The returned handle owns the task; dropping it or calling
    /// [`SweeperHandle::shutdown`] stops the sweep, so tests don't leak
    /// timers across runs.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh store
            // isn't swept before it has seen any traffic.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    debug!(removed, "swept expired rate limit entries");
                }
            }
        });
        SweeperHandle {
            handle: Some(handle),
        }
    }
}

/// Owner of the background sweep task. Aborts the task on drop.
#[derive(Debug)]
pub struct SweeperHandle {
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// A named fixed-window policy applied through a shared [`RateLimitStore`].
///
/// Keys are namespaced as `"<domain>:<key>"` so unrelated endpoints get
/// logically independent counter spaces even when they share one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub domain: &'static str,
    pub max_requests: u32,
    pub window_ms: i64,
}

/// Unauthenticated endpoints, keyed by client IP
pub const PUBLIC: RateLimitPolicy = RateLimitPolicy {
    domain: "ip",
    max_requests: 60,
    window_ms: 60_000,
};

/// Authenticated exchange queries, keyed by user ID
pub const AUTHENTICATED: RateLimitPolicy = RateLimitPolicy {
    domain: "user",
    max_requests: 30,
    window_ms: 60_000,
};

/// Order placement, keyed by user ID
pub const ORDERS: RateLimitPolicy = RateLimitPolicy {
    domain: "order",
    max_requests: 10,
    window_ms: 60_000,
};

/// Account signup attempts
pub const SIGNUP: RateLimitPolicy = RateLimitPolicy {
    domain: "signup",
    max_requests: 5,
    window_ms: 15 * 60_000,
};

/// Password reset requests
pub const PASSWORD_RESET: RateLimitPolicy = RateLimitPolicy {
    domain: "password-reset",
    max_requests: 10,
    window_ms: 15 * 60_000,
};

/// Support/contact form submissions
pub const SUPPORT: RateLimitPolicy = RateLimitPolicy {
    domain: "support",
    max_requests: 3,
    window_ms: 60 * 60_000,
};

impl RateLimitPolicy {
    pub fn check(&self, store: &RateLimitStore, key: &str) -> RateLimitResult {
        let result = store.check_limit(
            &format!("{}:{}", self.domain, key),
            self.max_requests,
            self.window_ms,
        );
        if !result.allowed {
            warn!(domain = self.domain, key, "request rejected by rate limit");
        }
        result
    }
}

/// `Retry-After` header value in whole seconds, rounded up
pub fn retry_after_secs(retry_after_ms: i64) -> i64 {
    (retry_after_ms + 999) / 1000
}

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
