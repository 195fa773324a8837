use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

const PRUNE_AT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window submission counter keyed by hashed client id.
/// `max == 0` disables limiting.
#[derive(Debug)]
pub struct SubmissionLimiter {
    max: u32,
    window: Duration,
    slots: Mutex<HashMap<String, Window>>,
}

impl SubmissionLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window, slots: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        if self.max == 0 {
            return Decision::Allowed { remaining: u32::MAX };
        }
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.len() >= PRUNE_AT {
            let window = self.window;
            slots.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let slot = slots.entry(key.to_string()).or_insert(Window { started: now, count: 0 });
        let age = now.saturating_duration_since(slot.started);
        if age >= self.window {
            *slot = Window { started: now, count: 0 };
        }
        if slot.count >= self.max {
            let retry_after = self.window.saturating_sub(now.saturating_duration_since(slot.started));
            debug!(retry_after_secs = retry_after.as_secs(), "submission limited");
            return Decision::Limited { retry_after };
        }
        slot.count += 1;
        Decision::Allowed { remaining: self.max - slot.count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_limits() {
        let l = SubmissionLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(l.check_at("a", t0), Decision::Allowed { remaining: 1 });
        assert_eq!(l.check_at("a", t0), Decision::Allowed { remaining: 0 });
        let d = l.check_at("a", t0 + Duration::from_secs(10));
        assert_eq!(d, Decision::Limited { retry_after: Duration::from_secs(50) });
        assert!(!d.is_allowed());
    }

    #[test]
    fn keys_are_independent() {
        let l = SubmissionLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(l.check_at("a", t0).is_allowed());
        assert!(!l.check_at("a", t0).is_allowed());
        assert!(l.check_at("b", t0).is_allowed());
    }

    #[test]
    fn window_resets_after_expiry() {
        let l = SubmissionLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(l.check_at("a", t0).is_allowed());
        assert!(!l.check_at("a", t0 + Duration::from_secs(59)).is_allowed());
        assert!(l.check_at("a", t0 + Duration::from_secs(60)).is_allowed());
    }

    #[test]
    fn zero_max_disables_limiting() {
        let l = SubmissionLimiter::new(0, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(l.check("a").is_allowed());
        }
    }
}
