//! TOML config file loading, validation, and seeding of the schedule store.
//!
//! Every section is optional; a missing section or key falls back to the
//! defaults below, which describe a small garden bed (68% starting
//! moisture, 1 s watering tick, 5 s sensor tick).

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::db::{Db, Frequency, ScheduleInput};
use crate::scheduler;
use crate::state::LightLevel;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub watering: WateringSettings,
    pub sensors: SensorSettings,
    pub scheduler: SchedulerSettings,
    pub storage: StorageSettings,
    pub schedules: Vec<ScheduleSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WateringSettings {
    /// Interval between watering ticks while a session runs.
    pub tick_ms: u64,
    /// Moisture points added per watering tick.
    pub moisture_step: f64,
    /// A session completes once moisture reaches this level.
    pub target_moisture: f64,
    /// Moisture at process start.
    pub initial_moisture: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    pub interval_sec: u64,
    /// Moisture points lost per sensor tick while idle.
    pub moisture_decay: f64,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
    pub light_level: LightLevel,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Offset of the garden's wall clock from UTC.  Schedule times are
    /// compared in this offset.
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Default number of watering logs returned by listings.
    pub log_limit: i64,
    /// Default number of sensor readings returned by listings.
    pub reading_limit: i64,
    /// Sensor readings kept; older ones are pruned.
    pub reading_retention: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSeed {
    pub time: String,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "default_seed_duration")]
    pub duration: i64,
    #[serde(default = "default_seed_active")]
    pub active: bool,
}

fn default_seed_duration() -> i64 {
    30
}

fn default_seed_active() -> bool {
    true
}

impl Default for WateringSettings {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            moisture_step: 1.0,
            target_moisture: 100.0,
            initial_moisture: 68.0,
        }
    }
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            interval_sec: 5,
            moisture_decay: 0.1,
            temperature_min: 22.0,
            temperature_max: 28.0,
            humidity_min: 55.0,
            humidity_max: 75.0,
            light_level: LightLevel::High,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            log_limit: 20,
            reading_limit: 100,
            reading_retention: 1000,
        }
    }
}

/// Largest accepted UTC offset, in minutes (±18h).
const MAX_UTC_OFFSET_MIN: i32 = 18 * 60;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all settings. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_watering(&mut errors);
        self.validate_sensors(&mut errors);
        self.validate_scheduler(&mut errors);
        self.validate_storage(&mut errors);
        self.validate_schedules(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_watering(&self, errors: &mut Vec<String>) {
        let w = &self.watering;
        if w.tick_ms == 0 {
            errors.push("watering.tick_ms must be positive".into());
        }
        if !(w.moisture_step > 0.0 && w.moisture_step <= 100.0) {
            errors.push(format!(
                "watering.moisture_step {} out of range (0, 100]",
                w.moisture_step
            ));
        }
        if !(w.target_moisture > 0.0 && w.target_moisture <= 100.0) {
            errors.push(format!(
                "watering.target_moisture {} out of range (0, 100]",
                w.target_moisture
            ));
        }
        if !(0.0..=100.0).contains(&w.initial_moisture) {
            errors.push(format!(
                "watering.initial_moisture {} out of range [0, 100]",
                w.initial_moisture
            ));
        }
    }

    fn validate_sensors(&self, errors: &mut Vec<String>) {
        let s = &self.sensors;
        if s.interval_sec == 0 {
            errors.push("sensors.interval_sec must be positive".into());
        }
        if !(s.moisture_decay >= 0.0 && s.moisture_decay <= 100.0) {
            errors.push(format!(
                "sensors.moisture_decay {} out of range [0, 100]",
                s.moisture_decay
            ));
        }
        if s.temperature_min >= s.temperature_max {
            errors.push(format!(
                "sensors.temperature_min ({}) must be below temperature_max ({})",
                s.temperature_min, s.temperature_max
            ));
        }
        if s.humidity_min < 0.0 || s.humidity_max > 100.0 {
            errors.push(format!(
                "sensors humidity range [{}, {}) must lie within [0, 100]",
                s.humidity_min, s.humidity_max
            ));
        }
        if s.humidity_min >= s.humidity_max {
            errors.push(format!(
                "sensors.humidity_min ({}) must be below humidity_max ({})",
                s.humidity_min, s.humidity_max
            ));
        }
    }

    fn validate_scheduler(&self, errors: &mut Vec<String>) {
        let offset = self.scheduler.utc_offset_minutes;
        if offset.unsigned_abs() > MAX_UTC_OFFSET_MIN.unsigned_abs() {
            errors.push(format!(
                "scheduler.utc_offset_minutes {offset} out of range [-{MAX_UTC_OFFSET_MIN}, {MAX_UTC_OFFSET_MIN}]"
            ));
        }
    }

    fn validate_storage(&self, errors: &mut Vec<String>) {
        if self.storage.log_limit <= 0 {
            errors.push(format!(
                "storage.log_limit must be positive, got {}",
                self.storage.log_limit
            ));
        }
        if self.storage.reading_limit <= 0 {
            errors.push(format!(
                "storage.reading_limit must be positive, got {}",
                self.storage.reading_limit
            ));
        }
        if self.storage.reading_retention <= 0 {
            errors.push(format!(
                "storage.reading_retention must be positive, got {}",
                self.storage.reading_retention
            ));
        }
    }

    fn validate_schedules(&self, errors: &mut Vec<String>) {
        for (i, s) in self.schedules.iter().enumerate() {
            for e in scheduler::field_errors(Some(&s.time), Some(s.duration)) {
                errors.push(format!("schedules[{i}]: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load + apply
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    parse(&contents).with_context(|| format!("invalid config: {path}"))
}

/// Parse and validate TOML text.
pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse config")?;
    config.validate()?;
    Ok(config)
}

/// Seed the schedule store from the config.  Seeds are only written into an
/// empty store so a file-backed database keeps its edited schedules.
pub async fn apply(config: &Config, db: &Db) -> Result<()> {
    let existing = db.count_schedules().await?;
    if existing > 0 {
        tracing::info!(existing, "schedule store not empty, skipping seeds");
        return Ok(());
    }

    for s in &config.schedules {
        db.create_schedule(&ScheduleInput {
            time: s.time.clone(),
            frequency: s.frequency,
            duration: s.duration,
            active: s.active,
        })
        .await
        .with_context(|| format!("failed to seed schedule at {}", s.time))?;
    }

    tracing::info!(schedules = config.schedules.len(), "config applied");

    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(time: &str, duration: i64) -> ScheduleSeed {
        ScheduleSeed {
            time: time.into(),
            frequency: Frequency::Daily,
            duration,
            active: true,
        }
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[watering]
tick_ms = 500
moisture_step = 2.0
target_moisture = 90
initial_moisture = 40

[sensors]
interval_sec = 10
moisture_decay = 0.5
light_level = "medium"

[scheduler]
utc_offset_minutes = 120

[storage]
log_limit = 5

[[schedules]]
time = "07:00"
frequency = "weekly"
duration = 45

[[schedules]]
time = "18:30"
active = false
"#;
        let config = parse(toml_str).unwrap();
        assert_eq!(config.watering.tick_ms, 500);
        assert_eq!(config.watering.target_moisture, 90.0);
        assert_eq!(config.sensors.light_level, LightLevel::Medium);
        // unspecified keys keep defaults
        assert_eq!(config.sensors.temperature_min, 22.0);
        assert_eq!(config.storage.reading_retention, 1000);
        assert_eq!(config.scheduler.utc_offset_minutes, 120);
        assert_eq!(config.schedules.len(), 2);
        assert_eq!(config.schedules[0].frequency, Frequency::Weekly);
        assert_eq!(config.schedules[1].duration, 30);
        assert!(!config.schedules[1].active);
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.watering.tick_ms, 1000);
        assert_eq!(config.watering.initial_moisture, 68.0);
        assert_eq!(config.sensors.interval_sec, 5);
        assert_eq!(config.sensors.moisture_decay, 0.1);
        assert_eq!(config.storage.log_limit, 20);
        assert_eq!(config.storage.reading_limit, 100);
        assert!(config.schedules.is_empty());
    }

    #[test]
    fn parse_rejects_unknown_frequency() {
        let err = parse("[[schedules]]\ntime = \"07:00\"\nfrequency = \"hourly\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }

    // -- Validation ---------------------------------------------------------

    #[test]
    fn default_config_passes() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_tick_rejected() {
        let mut cfg = Config::default();
        cfg.watering.tick_ms = 0;
        assert_validation_err(&cfg, "watering.tick_ms must be positive");
    }

    #[test]
    fn target_above_hundred_rejected() {
        let mut cfg = Config::default();
        cfg.watering.target_moisture = 120.0;
        assert_validation_err(&cfg, "watering.target_moisture 120 out of range");
    }

    #[test]
    fn negative_step_rejected() {
        let mut cfg = Config::default();
        cfg.watering.moisture_step = -1.0;
        assert_validation_err(&cfg, "watering.moisture_step");
    }

    #[test]
    fn inverted_temperature_range_rejected() {
        let mut cfg = Config::default();
        cfg.sensors.temperature_min = 30.0;
        assert_validation_err(&cfg, "must be below temperature_max");
    }

    #[test]
    fn humidity_outside_percent_rejected() {
        let mut cfg = Config::default();
        cfg.sensors.humidity_max = 120.0;
        assert_validation_err(&cfg, "must lie within [0, 100]");
    }

    #[test]
    fn utc_offset_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.scheduler.utc_offset_minutes = 20 * 60;
        assert_validation_err(&cfg, "utc_offset_minutes 1200 out of range");
    }

    #[test]
    fn most_negative_utc_offset_rejected_without_panic() {
        let err = parse("[scheduler]\nutc_offset_minutes = -2147483648\n").unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("utc_offset_minutes -2147483648 out of range"), "unexpected: {msg}");
    }

    #[test]
    fn storage_limits_must_be_positive() {
        let mut cfg = Config::default();
        cfg.storage.log_limit = 0;
        cfg.storage.reading_limit = 0;
        cfg.storage.reading_retention = -1;
        assert_validation_err(&cfg, "storage.log_limit must be positive");
        assert_validation_err(&cfg, "storage.reading_limit must be positive");
        assert_validation_err(&cfg, "storage.reading_retention must be positive");
    }

    #[test]
    fn bad_schedule_seed_rejected_with_index() {
        let mut cfg = Config::default();
        cfg.schedules = vec![seed("07:00", 30), seed("25:00", 30), seed("08:00", 2)];
        assert_validation_err(&cfg, "schedules[1]: time '25:00'");
        assert_validation_err(&cfg, "schedules[2]: duration 2");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = Config::default();
        cfg.watering.tick_ms = 0;
        cfg.sensors.interval_sec = 0;
        cfg.schedules = vec![seed("7am", 1000)];
        let msg = format!("{:#}", cfg.validate().unwrap_err());
        assert!(msg.contains("4 errors"), "unexpected: {msg}");
        assert!(msg.contains("watering.tick_ms"));
        assert!(msg.contains("sensors.interval_sec"));
        assert!(msg.contains("schedules[0]: time"));
        assert!(msg.contains("schedules[0]: duration"));
    }

    // -- DB integration ---------------------------------------------------

    #[tokio::test]
    async fn apply_seeds_empty_store_once() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let mut config = Config::default();
        config.schedules = vec![seed("08:00", 25), seed("07:00", 30)];

        apply(&config, &db).await.unwrap();
        apply(&config, &db).await.unwrap();

        let schedules = db.list_schedules().await.unwrap();
        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules[0].time, "07:00");
        assert_eq!(schedules[1].duration, 25);
    }
}
