use serde::Serialize;

pub const SESSION_DURATION_SECS: u64 = 15 * 60;

const URGENT_THRESHOLD_SECS: u64 = 5 * 60;
const WARNING_THRESHOLD_SECS: u64 = 10 * 60;

/// Whole seconds left in a session that started at `started_at_ms`.
///
/// A start stamp in the future (clock skew) counts as zero elapsed time.
pub fn remaining_secs(started_at_ms: i64, now_ms: i64, duration_secs: u64) -> u64 {
    let elapsed_secs = now_ms.saturating_sub(started_at_ms).max(0) / 1000;
    duration_secs.saturating_sub(elapsed_secs as u64)
}

/// `M:SS` rendering used by the session badge.
pub fn format_remaining(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerUrgency {
    Normal,
    Warning,
    Urgent,
}

impl TimerUrgency {
    pub fn from_remaining(secs: u64) -> Self {
        if secs <= URGENT_THRESHOLD_SECS {
            TimerUrgency::Urgent
        } else if secs <= WARNING_THRESHOLD_SECS {
            TimerUrgency::Warning
        } else {
            TimerUrgency::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimerUrgency::Normal => "normal",
            TimerUrgency::Warning => "warning",
            TimerUrgency::Urgent => "urgent",
        }
    }
}

/// One-shot expiry signal: fires the first time it observes zero, never again.
#[derive(Debug, Clone, Default)]
pub struct ExpiryLatch {
    fired: bool,
}

impl ExpiryLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly once, on the first observation of `remaining == 0`.
    pub fn observe(&mut self, remaining: u64) -> bool {
        if remaining == 0 && !self.fired {
            self.fired = true;
            return true;
        }
        false
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn full_duration_elapsed_leaves_zero() {
        let start = NOW - 900 * 1000;
        assert_eq!(remaining_secs(start, NOW, SESSION_DURATION_SECS), 0);
        assert_eq!(remaining_secs(start - 60_000, NOW, SESSION_DURATION_SECS), 0);
    }

    #[test]
    fn partial_seconds_round_down_elapsed() {
        assert_eq!(remaining_secs(NOW - 1_999, NOW, SESSION_DURATION_SECS), 899);
        assert_eq!(remaining_secs(NOW, NOW, SESSION_DURATION_SECS), 900);
        assert_eq!(remaining_secs(NOW + 5_000, NOW, SESSION_DURATION_SECS), 900);
    }

    #[test]
    fn expiry_fires_once_while_ticking_continues() {
        let start = NOW - 900 * 1000;
        let mut latch = ExpiryLatch::new();
        let fired = (0..10)
            .map(|tick| remaining_secs(start, NOW + tick * 1000, SESSION_DURATION_SECS))
            .filter(|remaining| latch.observe(*remaining))
            .count();
        assert_eq!(fired, 1);
        assert!(latch.has_fired());
    }

    #[test]
    fn latch_ignores_nonzero() {
        let mut latch = ExpiryLatch::new();
        assert!(!latch.observe(1));
        assert!(!latch.has_fired());
        assert!(latch.observe(0));
        assert!(!latch.observe(0));
    }

    #[test]
    fn urgency_thresholds() {
        assert_eq!(TimerUrgency::from_remaining(901), TimerUrgency::Normal);
        assert_eq!(TimerUrgency::from_remaining(601), TimerUrgency::Normal);
        assert_eq!(TimerUrgency::from_remaining(600), TimerUrgency::Warning);
        assert_eq!(TimerUrgency::from_remaining(301), TimerUrgency::Warning);
        assert_eq!(TimerUrgency::from_remaining(300), TimerUrgency::Urgent);
        assert_eq!(TimerUrgency::from_remaining(0), TimerUrgency::Urgent);
    }

    #[test]
    fn remaining_formats_as_minutes_and_seconds() {
        assert_eq!(format_remaining(900), "15:00");
        assert_eq!(format_remaining(61), "1:01");
        assert_eq!(format_remaining(0), "0:00");
    }
}
