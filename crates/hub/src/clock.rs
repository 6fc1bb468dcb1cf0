//! Wall clock in the garden's configured UTC offset.

use std::time::Duration;

use anyhow::{Context, Result};
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    offset: UtcOffset,
    pinned: Option<OffsetDateTime>,
}

impl Clock {
    pub fn new(offset: UtcOffset) -> Self {
        Self {
            offset,
            pinned: None,
        }
    }

    pub fn from_minutes(minutes: i32) -> Result<Self> {
        let invalid = || format!("invalid utc offset: {minutes} minutes");
        let seconds = minutes.checked_mul(60).with_context(invalid)?;
        let offset = UtcOffset::from_whole_seconds(seconds).with_context(invalid)?;
        Ok(Self::new(offset))
    }

    /// A clock that always reads `at`.
    #[cfg(test)]
    pub fn pinned(at: OffsetDateTime) -> Self {
        Self {
            offset: at.offset(),
            pinned: Some(at),
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Current time in the configured offset.
    pub fn now(&self) -> OffsetDateTime {
        match self.pinned {
            Some(at) => at,
            None => OffsetDateTime::now_utc().to_offset(self.offset),
        }
    }

    /// Time left until the next whole minute, so minute ticks stay aligned
    /// to the wall clock even when a check runs long.
    pub fn until_next_minute(&self) -> Duration {
        until_next_minute(self.now())
    }
}

pub fn until_next_minute(now: OffsetDateTime) -> Duration {
    let into_minute =
        Duration::from_secs(u64::from(now.second())) + Duration::from_nanos(u64::from(now.nanosecond()));
    Duration::from_secs(60).saturating_sub(into_minute)
}

// ===========================================================================
// Tests
// ===========================================================================
