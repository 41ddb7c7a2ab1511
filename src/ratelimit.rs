//! Per-user request rate limiting with temporary bans.
//!
//! Each user is tracked by a two-state machine: while `Normal`, requests
//! inside a sliding window are counted against a limit; exceeding the
//! limit trips the user into `Banned`, where every request is rejected
//! until the ban expires. The trip happens atomically with the request
//! that exceeded the limit: that request is denied, not admitted.
//!
//! State is keyed by Telegram user ID in a [`DashMap`], so admit
//! decisions for different users never block each other, while the
//! read-prune-decide-mutate sequence for a single user runs under that
//! user's entry guard and is linearizable.

use crate::clock::Clock;
use crate::config;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Limits applied to every user. Read once at startup, immutable after.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Maximum admitted requests per user within one window.
    pub request_limit: usize,
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Ban length in seconds once the limit is exceeded.
    pub ban_secs: u64,
}

impl RateLimiterConfig {
    /// Build the config from environment overrides, falling back to the
    /// process defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            request_limit: config::get_request_limit(),
            window_secs: config::get_rate_limit_window(),
            ban_secs: config::get_ban_duration(),
        }
    }
}

/// Per-user state of the limiter.
enum UserState {
    /// Request timestamps (seconds) inside the current window.
    /// Stale entries are pruned lazily on the next evaluation.
    Normal { recent: VecDeque<u64> },
    /// Rejecting everything until `until`. The request history is
    /// cleared at trip time, so a post-ban window starts fresh.
    Banned { until: u64 },
}

/// Outcome of a single state transition.
enum Verdict {
    Admit,
    Deny,
    Trip,
}

impl UserState {
    fn new() -> Self {
        Self::Normal {
            recent: VecDeque::new(),
        }
    }

    /// The single transition function: evaluates one request at `now`
    /// and mutates the state accordingly.
    fn step(&mut self, now: u64, cfg: &RateLimiterConfig) -> Verdict {
        match self {
            Self::Banned { until } if now < *until => Verdict::Deny,
            Self::Banned { .. } => {
                // Ban expired: re-enter as an unbanned user with an
                // empty history.
                *self = Self::new();
                self.step(now, cfg)
            }
            Self::Normal { recent } => {
                // Timestamps are appended in non-decreasing order, so
                // expired entries form a prefix. An entry exactly
                // window_secs old counts as expired.
                while recent
                    .front()
                    .is_some_and(|&t| now.saturating_sub(t) >= cfg.window_secs)
                {
                    recent.pop_front();
                }

                if recent.len() >= cfg.request_limit {
                    *self = Self::Banned {
                        until: now + cfg.ban_secs,
                    };
                    Verdict::Trip
                } else {
                    recent.push_back(now);
                    Verdict::Admit
                }
            }
        }
    }

    /// Whether this entry still carries live state at `now`.
    fn is_live(&self, now: u64, cfg: &RateLimiterConfig) -> bool {
        match self {
            Self::Banned { until } => now < *until,
            Self::Normal { recent } => recent
                .iter()
                .any(|&t| now.saturating_sub(t) < cfg.window_secs),
        }
    }
}

/// Decides, for each incoming request, whether to serve it.
///
/// The limiter owns all per-user state and performs no I/O; callers take
/// the admit decision first and only then start any slow external work.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use media_fetch_bot::clock::ManualClock;
/// use media_fetch_bot::ratelimit::{RateLimiter, RateLimiterConfig};
///
/// let clock = Arc::new(ManualClock::new(0));
/// let cfg = RateLimiterConfig { request_limit: 2, window_secs: 60, ban_secs: 300 };
/// let limiter = RateLimiter::new(cfg, clock);
///
/// assert!(limiter.admit(1));
/// assert!(limiter.admit(1));
/// assert!(!limiter.admit(1)); // limit exceeded, user is now banned
/// ```
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    users: DashMap<i64, UserState>,
    clock: Arc<dyn Clock>,
    denied: AtomicU64,
    tripped: AtomicU64,
}

impl RateLimiter {
    /// Create an empty limiter. Entries are created lazily on a user's
    /// first request and live for the process lifetime unless evicted.
    #[must_use]
    pub fn new(cfg: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            users: DashMap::new(),
            clock,
            denied: AtomicU64::new(0),
            tripped: AtomicU64::new(0),
        }
    }

    /// Decide whether to admit a request from `user_id` at the current
    /// clock reading.
    pub fn admit(&self, user_id: i64) -> bool {
        self.admit_at(user_id, self.clock.now_secs())
    }

    /// Decide whether to admit a request from `user_id` at `now`.
    ///
    /// Total over its domain: never fails, only admits or denies. `now`
    /// must be non-decreasing across calls.
    pub fn admit_at(&self, user_id: i64, now: u64) -> bool {
        // The entry guard is exclusive per key: concurrent calls for the
        // same user serialize here, different users proceed in parallel.
        let mut entry = self.users.entry(user_id).or_insert_with(UserState::new);

        match entry.step(now, &self.cfg) {
            Verdict::Admit => true,
            Verdict::Deny => {
                self.denied.fetch_add(1, Ordering::Relaxed);
                false
            }
            Verdict::Trip => {
                drop(entry);
                self.denied.fetch_add(1, Ordering::Relaxed);
                self.tripped.fetch_add(1, Ordering::Relaxed);
                info!(user_id, ban_secs = self.cfg.ban_secs, "User tripped rate limit, banned");
                false
            }
        }
    }

    /// Drop entries with no active ban and no in-window request history.
    ///
    /// Purely an operational measure against unbounded growth with the
    /// number of distinct users; admit decisions are correct without it.
    /// Returns the number of removed entries.
    pub fn evict_stale(&self) -> usize {
        let now = self.clock.now_secs();
        let before = self.users.len();
        self.users.retain(|_, state| state.is_live(now, &self.cfg));
        let removed = before.saturating_sub(self.users.len());
        if removed > 0 {
            debug!(removed, "Evicted stale rate limiter entries");
        }
        removed
    }

    /// Number of users currently tracked.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    /// Total number of denied requests (including trips).
    #[must_use]
    pub fn denied_count(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    /// Total number of bans issued.
    #[must_use]
    pub fn tripped_count(&self) -> u64 {
        self.tripped.load(Ordering::Relaxed)
    }

    /// The limits this limiter enforces.
    #[must_use]
    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }
}
