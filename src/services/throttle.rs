//! In-process login throttle keyed by `(account, client ip)`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::AuthThrottleConfig;

#[derive(Debug, Clone, Copy)]
struct Attempts {
    failures: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

pub struct LoginThrottle {
    enabled: bool,
    max_attempts: u32,
    window: Duration,
    lockout: Duration,
    attempts: Mutex<HashMap<String, Attempts>>,
}

impl LoginThrottle {
    #[must_use]
    pub fn new(config: &AuthThrottleConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts.max(1),
            window: Duration::from_secs(config.window_seconds),
            lockout: Duration::from_secs(config.lockout_seconds),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn key(account: &str, ip: Option<&str>) -> String {
        format!("{}|{}", account.trim().to_lowercase(), ip.unwrap_or("-"))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Attempts>> {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Err(retry_after)` while `key` is locked out.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        if !self.enabled {
            return Ok(());
        }
        let now = Instant::now();
        match self.lock().get(key).and_then(|a| a.locked_until) {
            Some(until) if until > now => Err(until - now),
            _ => Ok(()),
        }
    }

    /// Counts a failed attempt, starting a lockout once the window holds
    /// `max_attempts` failures.
    pub fn record_failure(&self, key: &str) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let mut attempts = self.lock();
        let entry = attempts.entry(key.to_string()).or_insert(Attempts {
            failures: 0,
            window_start: now,
            locked_until: None,
        });

        let lock_expired = entry.locked_until.is_some_and(|until| until <= now);
        if lock_expired || now.duration_since(entry.window_start) > self.window {
            *entry = Attempts {
                failures: 0,
                window_start: now,
                locked_until: None,
            };
        }

        entry.failures += 1;
        if entry.failures >= self.max_attempts {
            entry.locked_until = Some(now + self.lockout);
        }
    }

    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Forgets idle keys. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let mut attempts = self.lock();
        let before = attempts.len();
        attempts.retain(|_, a| {
            a.locked_until.is_some_and(|until| until > now)
                || now.duration_since(a.window_start) <= self.window
        });
        before - attempts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(max_attempts: u32) -> LoginThrottle {
        LoginThrottle::new(&AuthThrottleConfig {
            enabled: true,
            max_attempts,
            window_seconds: 60,
            lockout_seconds: 120,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_locks_after_max_failures() {
        let throttle = throttle(3);
        let key = LoginThrottle::key("Admin", Some("10.0.0.1"));

        throttle.record_failure(&key);
        throttle.record_failure(&key);
        assert!(throttle.check(&key).is_ok());

        throttle.record_failure(&key);
        let retry_after = throttle.check(&key).unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(120));

        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(throttle.check(&key).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_count() {
        let throttle = throttle(2);
        let key = LoginThrottle::key("admin", None);

        throttle.record_failure(&key);
        tokio::time::advance(Duration::from_secs(61)).await;
        throttle.record_failure(&key);

        assert!(throttle.check(&key).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_purge() {
        let throttle = throttle(1);
        let a = LoginThrottle::key("a", None);
        let b = LoginThrottle::key("b", None);

        throttle.record_failure(&a);
        throttle.reset(&a);
        assert!(throttle.check(&a).is_ok());

        throttle.record_failure(&b);
        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(throttle.purge(), 1);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        assert_eq!(
            LoginThrottle::key(" Admin ", Some("1.2.3.4")),
            LoginThrottle::key("admin", Some("1.2.3.4"))
        );
    }

    #[tokio::test]
    async fn test_disabled_never_locks() {
        let throttle = LoginThrottle::new(&AuthThrottleConfig {
            enabled: false,
            ..AuthThrottleConfig::default()
        });
        for _ in 0..10 {
            throttle.record_failure("k");
        }
        assert!(throttle.check("k").is_ok());
    }
}
