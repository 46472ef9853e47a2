use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::credential::Credential;
use crate::error::{RelayError, Result};

/// Limit and window shared by every credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub limit: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(60 * 60),
        }
    }
}

impl RateLimitPolicy {
    /// Human wording for the window, used in the rejection message.
    pub fn describe_window(&self) -> String {
        match self.window.as_secs() {
            3600 => "hour".to_string(),
            60 => "minute".to_string(),
            86400 => "day".to_string(),
            _ => humantime_serde::re::humantime::format_duration(self.window).to_string(),
        }
    }

    pub fn exceeded_error(&self) -> RelayError {
        RelayError::RateLimitExceeded {
            limit: self.limit,
            window: self.describe_window(),
        }
    }
}

/// Admission control keyed by credential.
///
/// Implementations must make the check-and-count step atomic per credential.
pub trait RateLimitAlgorithm: Send + Sync {
    /// Returns `Ok(true)` when the request may proceed and counts it.
    fn admit(&self, credential: &Credential) -> Result<bool>;

    /// Drops windows that have expired. Returns how many were removed.
    fn sweep_expired(&self) -> Result<usize>;

    fn policy(&self) -> RateLimitPolicy;
}

/// Accounting record for one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub reset_at: Instant,
}

impl RateWindow {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }
}

/// In-memory fixed window limiter. The window restarts from the first
/// request seen after the previous one expired.
pub struct FixedWindowLimiter {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<Credential, RateWindow>>,
}

impl FixedWindowLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn admit_at(&self, credential: &Credential, now: Instant) -> Result<bool> {
        let mut windows = self.windows.lock()
            .map_err(|_| RelayError::Internal("Failed to acquire lock on rate windows".to_string()))?;

        let window = windows
            .entry(credential.clone())
            .or_insert_with(|| RateWindow::fresh(now, self.policy.window));

        if window.is_expired(now) {
            *window = RateWindow::fresh(now, self.policy.window);
        }

        if window.count >= self.policy.limit {
            return Ok(false);
        }

        window.count += 1;
        Ok(true)
    }

    pub fn sweep_expired_at(&self, now: Instant) -> Result<usize> {
        let mut windows = self.windows.lock()
            .map_err(|_| RelayError::Internal("Failed to acquire lock on rate windows".to_string()))?;

        let initial_count = windows.len();
        windows.retain(|_, window| !window.is_expired(now));

        Ok(initial_count - windows.len())
    }

    /// Current window for a credential, if one is tracked.
    pub fn window(&self, credential: &Credential) -> Result<Option<RateWindow>> {
        let windows = self.windows.lock()
            .map_err(|_| RelayError::Internal("Failed to acquire lock on rate windows".to_string()))?;

        Ok(windows.get(credential).copied())
    }

    pub fn tracked_credentials(&self) -> Result<usize> {
        let windows = self.windows.lock()
            .map_err(|_| RelayError::Internal("Failed to acquire lock on rate windows".to_string()))?;

        Ok(windows.len())
    }
}

impl RateLimitAlgorithm for FixedWindowLimiter {
    fn admit(&self, credential: &Credential) -> Result<bool> {
        self.admit_at(credential, Instant::now())
    }

    fn sweep_expired(&self) -> Result<usize> {
        self.sweep_expired_at(Instant::now())
    }

    fn policy(&self) -> RateLimitPolicy {
        self.policy
    }
}
