//! Time-of-day schedule matching.
//!
//! Once per wall-clock minute the loop in [`run`] asks the coordinator to
//! check the schedule store.  An entry is due when it is active, its `HH:MM`
//! equals the current minute exactly, and its frequency allows today.  A
//! minute that is skipped (process paused, clock jump) is not backfilled.

use time::{Date, OffsetDateTime};
use tracing::{error, info};

use crate::clock::Clock;
use crate::coordinator::{Coordinator, Transition};
use crate::db::{Frequency, ScheduleEntry};

/// Accepted range for a schedule's configured duration, in seconds.
pub const MIN_DURATION_SEC: i64 = 5;
pub const MAX_DURATION_SEC: i64 = 300;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the schedule loop.  Intended to be `tokio::spawn`-ed from main.
pub async fn run(coordinator: Coordinator, clock: Clock) {
    info!(utc_offset = %clock.offset(), "schedule matcher started");

    loop {
        tokio::time::sleep(clock.until_next_minute()).await;

        let now = clock.now();
        match coordinator.check_schedules().await {
            Ok(Transition::Applied) => {
                info!(minute = %hhmm(now), "scheduled watering started");
            }
            Ok(Transition::Ignored) => {}
            Err(e) => {
                error!(minute = %hhmm(now), "schedule check failed: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// `"HH:MM"` for the given local time.
pub fn hhmm(now: OffsetDateTime) -> String {
    format!("{:02}:{:02}", now.hour(), now.minute())
}

/// Parse a strict `"HH:MM"` (two digits each, 00:00..=23:59).
pub fn parse_hhmm(s: &str) -> Option<(u8, u8)> {
    let b = s.as_bytes();
    if b.len() != 5 || b[2] != b':' {
        return None;
    }
    let digits = [b[0], b[1], b[3], b[4]];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let hour = (b[0] - b'0') * 10 + (b[1] - b'0');
    let minute = (b[3] - b'0') * 10 + (b[4] - b'0');
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Whether an entry with `frequency`, created on `created`, runs on `today`.
pub fn is_due_on(frequency: Frequency, created: Date, today: Date) -> bool {
    match frequency {
        Frequency::Daily => true,
        Frequency::Every2Days => (today - created).whole_days().rem_euclid(2) == 0,
        Frequency::Weekly => today.weekday() == created.weekday(),
    }
}

/// Entries that should fire in the minute containing `now`.
pub fn due_entries(entries: &[ScheduleEntry], now: OffsetDateTime) -> Vec<&ScheduleEntry> {
    let minute = hhmm(now);
    let today = now.date();
    entries
        .iter()
        .filter(|e| e.active && e.time == minute)
        .filter(|e| {
            let created = e.created_at.to_offset(now.offset()).date();
            is_due_on(e.frequency, created, today)
        })
        .collect()
}

/// Validation shared by config seeds and the HTTP glue.  `None` skips a field.
pub fn field_errors(time: Option<&str>, duration: Option<i64>) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(t) = time {
        if parse_hhmm(t).is_none() {
            errors.push(format!("time '{t}' is not a valid HH:MM time"));
        }
    }
    if let Some(d) = duration {
        if !(MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&d) {
            errors.push(format!(
                "duration {d} out of range [{MIN_DURATION_SEC}, {MAX_DURATION_SEC}] seconds"
            ));
        }
    }
    errors
}

// ---------------------------------------------------------------------------
// Once-per-minute marker
// ---------------------------------------------------------------------------

/// Remembers the last minute a scheduled start fired, so repeated checks in
/// the same minute cannot start a second session.
#[derive(Debug, Default)]
pub struct Matcher {
    fired: Option<(Date, u8, u8)>,
}

impl Matcher {
    fn key(now: OffsetDateTime) -> (Date, u8, u8) {
        (now.date(), now.hour(), now.minute())
    }

    pub fn fired_in(&self, now: OffsetDateTime) -> bool {
        self.fired == Some(Self::key(now))
    }

    pub fn mark(&mut self, now: OffsetDateTime) {
        self.fired = Some(Self::key(now));
    }
}

// ===========================================================================
// Tests
// ===========================================================================
