//! Time-of-day windows with midnight wraparound.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// A daily time window `[start, end]`, inclusive on both ends.
///
/// Windows may cross midnight: when `end < start` the window covers
/// `[start, 24:00) ∪ [00:00, end]` and containment becomes
/// `t >= start OR t <= end`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build a window from `HH:MM` pairs. Returns `None` on malformed input.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        let start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
        Some(Self { start, end })
    }

    /// Whether `t` falls inside this window.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.end < self.start {
            // Wraps past midnight
            t >= self.start || t <= self.end
        } else {
            t >= self.start && t <= self.end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn test_plain_window() {
        let w = TimeWindow::parse("07:00", "10:00").unwrap();
        assert!(w.contains(t("07:00")));
        assert!(w.contains(t("08:30")));
        assert!(w.contains(t("10:00")));
        assert!(!w.contains(t("06:59")));
        assert!(!w.contains(t("10:01")));
    }

    #[test]
    fn test_midnight_wrap() {
        let w = TimeWindow::parse("22:00", "05:00").unwrap();
        assert!(w.contains(t("23:30")));
        assert!(w.contains(t("00:00")));
        assert!(w.contains(t("04:59")));
        assert!(w.contains(t("22:00")));
        assert!(w.contains(t("05:00")));
        assert!(!w.contains(t("12:00")));
        assert!(!w.contains(t("21:59")));
        assert!(!w.contains(t("05:01")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TimeWindow::parse("7am", "10:00").is_none());
        assert!(TimeWindow::parse("07:00", "25:00").is_none());
    }
}
