//! The open watering session and the numbers derived from it.
//!
//! ```text
//! Idle ──start(kind)──▶ Running ──tick: moisture += step──┐
//!  ▲                      │  ▲                            │
//!  │                      │  └──────[moisture < target]───┘
//!  └──stop(completed)─────┘
//!  ▲                                                      │
//!  └──────────[moisture >= target] stop(completed=true)───┘
//! ```

use time::OffsetDateTime;

use crate::db::{LogClose, LogStatus, WateringKind};
use crate::protocol::{Notification, Severity, WateringProgress};

/// Present exactly while the pump runs.  `id` is the id of the open log.
#[derive(Debug, Clone, PartialEq)]
pub struct WateringSession {
    pub id: String,
    pub kind: WateringKind,
    pub start_time: OffsetDateTime,
    pub start_moisture: u8,
}

impl WateringSession {
    /// Whole seconds since the session started, never negative.
    pub fn elapsed_secs(&self, now: OffsetDateTime) -> i64 {
        (now - self.start_time).whole_seconds().max(0)
    }

    /// Share of the way from the starting moisture to `target`, in percent.
    pub fn progress(&self, current: f64, target: f64) -> f64 {
        let start = f64::from(self.start_moisture);
        if target <= start {
            return 100.0;
        }
        ((current - start) / (target - start) * 100.0).clamp(0.0, 100.0)
    }

    pub fn progress_report(&self, now: OffsetDateTime, current: f64, target: f64) -> WateringProgress {
        WateringProgress {
            is_active: true,
            progress: self.progress(current, target),
            time_elapsed: self.elapsed_secs(now),
            current_moisture: current.round().clamp(0.0, 100.0) as u8,
        }
    }

    /// The fields written when this session's log is closed.
    pub fn closing(&self, now: OffsetDateTime, end_moisture: u8, completed: bool) -> LogClose {
        LogClose {
            end_time: now,
            end_moisture: i64::from(end_moisture),
            status: if completed {
                LogStatus::Completed
            } else {
                LogStatus::Stopped
            },
            duration: self.elapsed_secs(now),
        }
    }
}

pub fn started_notice(kind: WateringKind) -> Notification {
    Notification {
        title: "Watering started".into(),
        message: format!("{kind} watering session began"),
        severity: Severity::Info,
    }
}

pub fn finished_notice(completed: bool, moisture: u8) -> Notification {
    if completed {
        Notification {
            title: "Watering completed!".into(),
            message: format!("Watering completed! Moisture level reached {moisture}%"),
            severity: Severity::Success,
        }
    } else {
        Notification {
            title: "Watering stopped".into(),
            message: format!("Watering stopped. Moisture level: {moisture}%"),
            severity: Severity::Info,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    fn session(start_moisture: u8) -> WateringSession {
        WateringSession {
            id: "log-1".into(),
            kind: WateringKind::Manual,
            start_time: datetime!(2026-05-01 07:00:00 UTC),
            start_moisture,
        }
    }

    #[test]
    fn elapsed_is_floored_seconds() {
        let s = session(50);
        let now = s.start_time + Duration::milliseconds(32_900);
        assert_eq!(s.elapsed_secs(now), 32);
    }

    #[test]
    fn elapsed_never_negative_under_clock_skew() {
        let s = session(50);
        assert_eq!(s.elapsed_secs(s.start_time - Duration::seconds(5)), 0);
    }

    #[test]
    fn progress_tracks_moisture_toward_target() {
        let s = session(60);
        assert_eq!(s.progress(60.0, 100.0), 0.0);
        assert_eq!(s.progress(80.0, 100.0), 50.0);
        assert_eq!(s.progress(100.0, 100.0), 100.0);
    }

    #[test]
    fn progress_full_when_started_at_target() {
        assert_eq!(session(100).progress(100.0, 100.0), 100.0);
    }

    #[test]
    fn closing_sets_status_from_completion() {
        let s = session(68);
        let now = s.start_time + Duration::seconds(32);
        let done = s.closing(now, 100, true);
        assert_eq!(done.status, LogStatus::Completed);
        assert_eq!(done.duration, 32);
        assert_eq!(done.end_moisture, 100);

        let stopped = s.closing(now, 80, false);
        assert_eq!(stopped.status, LogStatus::Stopped);
    }

    #[test]
    fn notices_mention_moisture() {
        let n = finished_notice(true, 100);
        assert_eq!(n.severity, Severity::Success);
        assert!(n.message.contains("100%"));

        let n = finished_notice(false, 74);
        assert_eq!(n.severity, Severity::Info);
        assert!(n.message.contains("74%"));

        assert_eq!(
            started_notice(WateringKind::Scheduled).message,
            "scheduled watering session began"
        );
    }
}
