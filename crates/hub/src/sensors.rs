//! Synthetic garden sensors.
//!
//! Each sensor tick:
//! - moisture dries out by a small fixed step while the pump is idle
//! - temperature and humidity are redrawn uniformly from their ranges
//! - light level stays at its configured value
//!
//! The watering session never reads this module, so its cadence and the
//! sensor cadence vary independently.

use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, error, info};

use crate::config::SensorSettings;
use crate::coordinator::Coordinator;
use crate::db::NewReading;
use crate::state::SystemState;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the sensor loop.  Intended to be `tokio::spawn`-ed from main.
pub async fn run(coordinator: Coordinator, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick of `interval` fires immediately; the first sample is
    // taken one interval after startup.
    ticker.tick().await;

    info!(interval_ms = interval.as_millis() as u64, "sensor simulator started");

    loop {
        ticker.tick().await;
        if let Err(e) = coordinator.sample_sensors_at(OffsetDateTime::now_utc()).await {
            error!("sensor tick failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct SensorSimulator {
    rng: fastrand::Rng,
    settings: SensorSettings,
}

impl SensorSimulator {
    pub fn new(settings: SensorSettings) -> Self {
        Self::with_rng(settings, fastrand::Rng::new())
    }

    /// Deterministic simulator for tests.
    pub fn with_rng(settings: SensorSettings, rng: fastrand::Rng) -> Self {
        Self { rng, settings }
    }

    /// Advance `state` by one sensor tick and return the reading to store.
    pub fn sample(&mut self, state: &mut SystemState, now: OffsetDateTime) -> NewReading {
        if !state.is_watering && state.moisture > 0.0 {
            state.moisture = (state.moisture - self.settings.moisture_decay).max(0.0);
        }

        state.temperature = self.uniform(self.settings.temperature_min, self.settings.temperature_max);
        state.humidity = self.uniform(self.settings.humidity_min, self.settings.humidity_max);
        state.light_level = self.settings.light_level;

        debug!(
            moisture = format!("{:.1}", state.moisture),
            temperature = format!("{:.1}", state.temperature),
            humidity = format!("{:.1}", state.humidity),
            "sensor sample"
        );

        NewReading {
            moisture_level: i64::from(state.moisture_level()),
            temperature: state.temperature.round() as i64,
            humidity: state.humidity.round() as i64,
            light_level: state.light_level,
            timestamp: now,
        }
    }

    /// Uniform draw from `[lo, hi)`.
    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.rng.f64() * (hi - lo)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
