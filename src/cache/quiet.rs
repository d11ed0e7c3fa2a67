//! Daily quiet window
//!
//! Stateless: whether a moment is quiet depends only on its local hour.

use chrono::{DateTime, TimeZone, Timelike};

/// A daily range of hours, `[start_hour, end_hour)`, during which automatic
/// refreshes are suppressed
///
/// A window whose start is after its end wraps past midnight. Equal bounds
/// describe an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for QuietWindow {
    fn default() -> Self {
        Self {
            start_hour: 0,
            end_hour: 9,
        }
    }
}

impl QuietWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// A window that never applies
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    pub fn contains<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        let hour = now.hour();
        if self.start_hour <= self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Whether `now` falls in the default 00:00–09:00 quiet window
pub fn is_quiet_hours<Tz: TimeZone>(now: &DateTime<Tz>) -> bool {
    QuietWindow::default().contains(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_default_window_covers_midnight_to_nine() {
        assert!(is_quiet_hours(&at(0, 0)));
        assert!(is_quiet_hours(&at(2, 0)));
        assert!(is_quiet_hours(&at(8, 59)));
        assert!(!is_quiet_hours(&at(9, 0)));
        assert!(!is_quiet_hours(&at(14, 0)));
        assert!(!is_quiet_hours(&at(23, 59)));
    }

    #[test]
    fn test_uses_the_hour_of_the_given_offset() {
        let offset = FixedOffset::east_opt(5 * 3600).unwrap();
        // 22:00 UTC is 03:00 at +05:00
        let local = at(22, 0).with_timezone(&offset);
        assert!(is_quiet_hours(&local));
    }

    #[test]
    fn test_wrapping_window() {
        let window = QuietWindow::new(22, 6);
        assert!(window.contains(&at(23, 0)));
        assert!(window.contains(&at(5, 59)));
        assert!(!window.contains(&at(6, 0)));
        assert!(!window.contains(&at(12, 0)));
    }

    #[test]
    fn test_disabled_window_never_applies() {
        let window = QuietWindow::disabled();
        for hour in 0..24 {
            assert!(!window.contains(&at(hour, 0)));
        }
    }
}
