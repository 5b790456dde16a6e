//! Per-client submission throttling.
//!
//! The gateway talks to a [`RateLimiter`] so the backing store can be swapped:
//! [`SlidingWindowLimiter`] keeps everything in process memory, which means
//! each serving instance enforces its own limit and a restart forgets all
//! history. Multi-instance deployments should plug in a shared store instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Attempt recorded; `remaining` more fit in the current window.
    Allowed { remaining: usize },
    Limited,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

pub trait RateLimiter: Send + Sync {
    /// Checks `key` against its window and, when admitted, records the attempt.
    fn check(&self, key: &str) -> RateDecision;
}

/// In-memory sliding window keyed by client address.
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    clock: C,
    max_attempts: usize,
    window_millis: u64,
    records: Mutex<HashMap<String, Vec<u64>>>,
}

impl SlidingWindowLimiter<SystemClock> {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self::with_clock(max_attempts, window, SystemClock)
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    pub fn with_clock(max_attempts: usize, window: Duration, clock: C) -> Self {
        Self {
            clock,
            max_attempts,
            window_millis: window.as_millis() as u64,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, Vec<u64>>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drops keys whose timestamps have all aged out. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let window = self.window_millis;
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, stamps| {
            stamps.retain(|&stamp| now.saturating_sub(stamp) < window);
            !stamps.is_empty()
        });
        before - records.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.records().len()
    }
}

impl<C: Clock> RateLimiter for SlidingWindowLimiter<C> {
    fn check(&self, key: &str) -> RateDecision {
        let now = self.clock.now_millis();
        let window = self.window_millis;
        let mut records = self.records();
        let stamps = records.entry(key.to_string()).or_default();

        stamps.retain(|&stamp| now.saturating_sub(stamp) < window);

        if stamps.len() >= self.max_attempts {
            return RateDecision::Limited;
        }

        stamps.push(now);
        RateDecision::Allowed {
            remaining: self.max_attempts - stamps.len(),
        }
    }
}
