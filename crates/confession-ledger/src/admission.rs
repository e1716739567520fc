//! # Admission Control
//!
//! Per-identity fixed-window rate limiting, plus the typed outcome of
//! [`Ledger::admit_submission`](crate::Ledger::admit_submission).
//!
//! ## Algorithm
//!
//! - The first request from an identity opens a window of length `W` with
//!   `Q - 1` admissions left
//! - Each further request inside the window consumes one
//! - With none left, requests are denied until the window ends
//! - The next request after that opens a fresh window
//!
//! State lives in memory only and resets when the process restarts.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use confession_ledger_core::{Identity, SubmissionId};

use crate::config::RateLimitConfig;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// Admitted; `remaining` more are allowed in this window.
    Allowed { remaining: u32 },
    /// Over quota until the window ends.
    Denied { retry_after: Duration },
}

impl Quota {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Quota::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    remaining: u32,
}

/// Fixed-window rate limiter keyed by identity.
pub struct AdmissionController {
    window: Duration,
    quota: u32,
    windows: Mutex<HashMap<Identity, Window>>,
}

impl AdmissionController {
    pub fn new(window: Duration, quota: u32) -> Self {
        Self {
            window,
            quota,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.window(), config.quota)
    }

    /// Check the quota for `identity` and consume one admission if allowed.
    ///
    /// Check and decrement happen under one lock, so concurrent callers for
    /// the same identity can never overspend the quota.
    pub fn check_and_consume(&self, identity: &Identity) -> Quota {
        self.check_and_consume_at(identity, Instant::now())
    }

    /// [`check_and_consume`](Self::check_and_consume) with an explicit clock.
    pub fn check_and_consume_at(&self, identity: &Identity, now: Instant) -> Quota {
        if self.quota == 0 {
            return Quota::Denied {
                retry_after: self.window,
            };
        }

        let mut windows = self.lock();
        match windows.entry(*identity) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                let elapsed = now.saturating_duration_since(window.started);
                if elapsed >= self.window {
                    *window = Window {
                        started: now,
                        remaining: self.quota - 1,
                    };
                    Quota::Allowed {
                        remaining: window.remaining,
                    }
                } else if window.remaining == 0 {
                    Quota::Denied {
                        retry_after: self.window - elapsed,
                    }
                } else {
                    window.remaining -= 1;
                    Quota::Allowed {
                        remaining: window.remaining,
                    }
                }
            }
            Entry::Vacant(entry) => {
                let window = entry.insert(Window {
                    started: now,
                    remaining: self.quota - 1,
                });
                Quota::Allowed {
                    remaining: window.remaining,
                }
            }
        }
    }

    /// Drop windows that have ended. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - windows.len()
    }

    /// Number of identities with a live window.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, Window>> {
        // Every update leaves the map consistent, so a poisoned lock is safe to reuse.
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("window", &self.window)
            .field("quota", &self.quota)
            .field("tracked", &self.tracked())
            .finish()
    }
}

/// Result of an admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The submission is pending and will be sealed into a later block.
    Accepted {
        id: SubmissionId,
        remaining_quota: u32,
    },
    Rejected(Rejection),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted { .. })
    }

    /// The id of an accepted submission.
    pub fn id(&self) -> Option<SubmissionId> {
        match self {
            Admission::Accepted { id, .. } => Some(*id),
            Admission::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Admission::Accepted { .. } => None,
            Admission::Rejected(reason) => Some(reason),
        }
    }
}

/// Why a submission was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Malformed signature or identity, or the signature recovers to a
    /// different identity than claimed.
    InvalidSignature,
    RateLimited { retry_after: Duration },
    TooLong { len: usize, max: usize },
    InvalidCategory(String),
    EmptyContent,
}

impl Rejection {
    /// Stable reason code for the request layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::InvalidSignature => "invalid_signature",
            Rejection::RateLimited { .. } => "rate_limited",
            Rejection::TooLong { .. } => "too_long",
            Rejection::InvalidCategory(_) => "invalid_category",
            Rejection::EmptyContent => "empty_content",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::RateLimited { retry_after } => {
                write!(f, "rate_limited (retry in {}s)", retry_after.as_secs())
            }
            Rejection::TooLong { len, max } => write!(f, "too_long ({len} > {max})"),
            Rejection::InvalidCategory(category) => write!(f, "invalid_category ({category})"),
            _ => f.write_str(self.as_str()),
        }
    }
}
