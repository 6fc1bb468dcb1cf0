//! SQLite-backed stores for schedules, watering logs and sensor readings.
//!
//! The default URL is an in-memory database, so nothing survives a restart
//! unless a file URL is configured.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::LightLevel;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

// ---------------------------------------------------------------------------
// Enumerations stored as TEXT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Every2Days,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WateringKind {
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Running,
    Completed,
    Stopped,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(anyhow!(concat!("unknown ", stringify!($ty), " '{}'"), other)),
                }
            }
        }
    };
}

text_enum!(Frequency { Daily => "daily", Every2Days => "every2days", Weekly => "weekly" });
text_enum!(WateringKind { Manual => "manual", Scheduled => "scheduled" });
text_enum!(LogStatus { Running => "running", Completed => "completed", Stopped => "stopped" });

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub time: String, // HH:MM
    pub frequency: Frequency,
    pub duration: i64, // seconds
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields accepted when creating a schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInput {
    pub time: String,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "default_duration")]
    pub duration: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulePatch {
    pub time: Option<String>,
    pub frequency: Option<Frequency>,
    pub duration: Option<i64>,
    pub active: Option<bool>,
}

fn default_duration() -> i64 {
    30
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WateringLogRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: WateringKind,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub start_moisture: i64,
    pub end_moisture: Option<i64>,
    pub status: LogStatus,
    pub duration: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewLog {
    pub kind: WateringKind,
    pub start_time: OffsetDateTime,
    pub start_moisture: i64,
}

/// The one-time mutation that closes a running log.
#[derive(Debug, Clone)]
pub struct LogClose {
    pub end_time: OffsetDateTime,
    pub end_moisture: i64,
    pub status: LogStatus,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReadingRecord {
    pub id: String,
    pub moisture_level: i64,
    pub temperature: i64,
    pub humidity: i64,
    pub light_level: LightLevel,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewReading {
    pub moisture_level: i64,
    pub temperature: i64,
    pub humidity: i64,
    pub light_level: LightLevel,
    pub timestamp: OffsetDateTime,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct ScheduleRow {
    id: String,
    time: String,
    frequency: String,
    duration: i64,
    active: bool,
    created_at: i64,
}

impl TryFrom<ScheduleRow> for ScheduleEntry {
    type Error = anyhow::Error;

    fn try_from(r: ScheduleRow) -> Result<Self> {
        Ok(Self {
            frequency: r.frequency.parse()?,
            created_at: from_unix_ms(r.created_at)?,
            id: r.id,
            time: r.time,
            duration: r.duration,
            active: r.active,
        })
    }
}

#[derive(FromRow)]
struct LogRow {
    id: String,
    kind: String,
    start_time: i64,
    end_time: Option<i64>,
    start_moisture: i64,
    end_moisture: Option<i64>,
    status: String,
    duration: Option<i64>,
}

impl TryFrom<LogRow> for WateringLogRecord {
    type Error = anyhow::Error;

    fn try_from(r: LogRow) -> Result<Self> {
        Ok(Self {
            kind: r.kind.parse()?,
            start_time: from_unix_ms(r.start_time)?,
            end_time: r.end_time.map(from_unix_ms).transpose()?,
            status: r.status.parse()?,
            id: r.id,
            start_moisture: r.start_moisture,
            end_moisture: r.end_moisture,
            duration: r.duration,
        })
    }
}

#[derive(FromRow)]
struct ReadingRow {
    id: String,
    moisture_level: i64,
    temperature: i64,
    humidity: i64,
    light_level: String,
    ts: i64,
}

impl TryFrom<ReadingRow> for SensorReadingRecord {
    type Error = anyhow::Error;

    fn try_from(r: ReadingRow) -> Result<Self> {
        Ok(Self {
            light_level: r.light_level.parse().map_err(|e: String| anyhow!(e))?,
            timestamp: from_unix_ms(r.ts)?,
            id: r.id,
            moisture_level: r.moisture_level,
            temperature: r.temperature,
            humidity: r.humidity,
        })
    }
}

pub(crate) fn to_unix_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_unix_ms(ms: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .with_context(|| format!("timestamp {ms} out of range"))
}

const SCHEDULE_COLUMNS: &str = "id, time, frequency, duration, active, created_at";
const LOG_COLUMNS: &str =
    "id, kind, start_time, end_time, start_moisture, end_moisture, status, duration";
const READING_COLUMNS: &str = "id, moisture_level, temperature, humidity, light_level, ts";

impl Db {
    /// db_url examples:
    /// - "sqlite::memory:" (default, tests)
    /// - "sqlite:/var/lib/watering/hub.db?mode=rwc"
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own empty
        // database, so the pool must hold exactly one and never recycle it.
        let in_memory = db_url.contains(":memory:") || db_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    /// Close the pool; every later call fails.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ----------------------------
    // Schedules
    // ----------------------------

    /// All schedule entries ordered by time of day.
    pub async fn list_schedules(&self) -> Result<Vec<ScheduleEntry>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY time, created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .context("list_schedules failed")?;

        rows.into_iter().map(ScheduleEntry::try_from).collect()
    }

    pub async fn get_schedule(&self, id: &str) -> Result<Option<ScheduleEntry>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("get_schedule failed")?;

        row.map(ScheduleEntry::try_from).transpose()
    }

    pub async fn create_schedule(&self, input: &ScheduleInput) -> Result<ScheduleEntry> {
        let entry = ScheduleEntry {
            id: Uuid::new_v4().to_string(),
            time: input.time.clone(),
            frequency: input.frequency,
            duration: input.duration,
            active: input.active,
            created_at: OffsetDateTime::now_utc(),
        };

        sqlx::query(
            r#"
            INSERT INTO schedules (id, time, frequency, duration, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.time)
        .bind(entry.frequency.as_str())
        .bind(entry.duration)
        .bind(entry.active)
        .bind(to_unix_ms(entry.created_at))
        .execute(&self.pool)
        .await
        .context("create_schedule failed")?;

        Ok(entry)
    }

    /// Apply a partial update.  Returns `None` if no entry has this id.
    pub async fn update_schedule(
        &self,
        id: &str,
        patch: &SchedulePatch,
    ) -> Result<Option<ScheduleEntry>> {
        let Some(mut entry) = self.get_schedule(id).await? else {
            return Ok(None);
        };

        if let Some(time) = &patch.time {
            entry.time = time.clone();
        }
        if let Some(frequency) = patch.frequency {
            entry.frequency = frequency;
        }
        if let Some(duration) = patch.duration {
            entry.duration = duration;
        }
        if let Some(active) = patch.active {
            entry.active = active;
        }

        sqlx::query(
            r#"
            UPDATE schedules
            SET time = ?, frequency = ?, duration = ?, active = ?
            WHERE id = ?
            "#,
        )
        .bind(&entry.time)
        .bind(entry.frequency.as_str())
        .bind(entry.duration)
        .bind(entry.active)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("update_schedule failed")?;

        Ok(Some(entry))
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete_schedule failed")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn count_schedules(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schedules")
            .fetch_one(&self.pool)
            .await
            .context("count_schedules failed")?;
        Ok(n)
    }

    // ----------------------------
    // Watering logs
    // ----------------------------

    /// Insert a log in `running` status and return its id.
    pub async fn append_log(&self, log: &NewLog) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO watering_logs (id, kind, start_time, start_moisture, status)
            VALUES (?, ?, ?, ?, 'running')
            "#,
        )
        .bind(&id)
        .bind(log.kind.as_str())
        .bind(to_unix_ms(log.start_time))
        .bind(log.start_moisture)
        .execute(&self.pool)
        .await
        .context("append_log failed")?;
        Ok(id)
    }

    /// Close a running log.  Returns `None` if the id is unknown or the log
    /// was already closed; a closed log is never touched again.
    pub async fn close_log(&self, id: &str, close: &LogClose) -> Result<Option<WateringLogRecord>> {
        let res = sqlx::query(
            r#"
            UPDATE watering_logs
            SET end_time = ?, end_moisture = ?, status = ?, duration = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(to_unix_ms(close.end_time))
        .bind(close.end_moisture)
        .bind(close.status.as_str())
        .bind(close.duration)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("close_log failed")?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_log(id).await
    }

    pub async fn get_log(&self, id: &str) -> Result<Option<WateringLogRecord>> {
        let row = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM watering_logs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("get_log failed")?;

        row.map(WateringLogRecord::try_from).transpose()
    }

    /// Newest-first, at most `limit` entries.
    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<WateringLogRecord>> {
        let rows = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM watering_logs ORDER BY start_time DESC, rowid DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("recent_logs failed")?;

        rows.into_iter().map(WateringLogRecord::try_from).collect()
    }

    pub async fn running_log_count(&self) -> Result<i64> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM watering_logs WHERE status = 'running'")
                .fetch_one(&self.pool)
                .await
                .context("running_log_count failed")?;
        Ok(n)
    }

    /// Close every log left `running` by a previous process as `stopped` at
    /// `now`.  Nothing is watering at startup, so any such log is stale.
    pub async fn stop_orphaned_logs(&self, now: OffsetDateTime) -> Result<u64> {
        let now_ms = to_unix_ms(now);
        let res = sqlx::query(
            r#"
            UPDATE watering_logs
            SET end_time = ?,
                end_moisture = start_moisture,
                status = 'stopped',
                duration = MAX(0, (? - start_time) / 1000)
            WHERE status = 'running'
            "#,
        )
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .context("stop_orphaned_logs failed")?;

        Ok(res.rows_affected())
    }

    // ----------------------------
    // Sensor readings
    // ----------------------------

    pub async fn append_reading(&self, r: &NewReading) -> Result<SensorReadingRecord> {
        let record = SensorReadingRecord {
            id: Uuid::new_v4().to_string(),
            moisture_level: r.moisture_level,
            temperature: r.temperature,
            humidity: r.humidity,
            light_level: r.light_level,
            timestamp: r.timestamp,
        };

        sqlx::query(
            r#"
            INSERT INTO sensor_readings (id, moisture_level, temperature, humidity, light_level, ts)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.moisture_level)
        .bind(record.temperature)
        .bind(record.humidity)
        .bind(record.light_level.as_str())
        .bind(to_unix_ms(record.timestamp))
        .execute(&self.pool)
        .await
        .context("append_reading failed")?;

        Ok(record)
    }

    /// Drop everything but the newest `keep` readings.
    pub async fn prune_readings(&self, keep: i64) -> Result<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM sensor_readings
            WHERE seq NOT IN (
              SELECT seq FROM sensor_readings ORDER BY seq DESC LIMIT ?
            )
            "#,
        )
        .bind(keep)
        .execute(&self.pool)
        .await
        .context("prune_readings failed")?;
        Ok(res.rows_affected())
    }

    /// Newest-first, at most `limit` entries.
    pub async fn recent_readings(&self, limit: i64) -> Result<Vec<SensorReadingRecord>> {
        let rows = sqlx::query_as::<_, ReadingRow>(&format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings ORDER BY seq DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("recent_readings failed")?;

        rows.into_iter().map(SensorReadingRecord::try_from).collect()
    }

    pub async fn latest_reading(&self) -> Result<Option<SensorReadingRecord>> {
        Ok(self.recent_readings(1).await?.into_iter().next())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    async fn mem_db() -> Db {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn input(time: &str, active: bool) -> ScheduleInput {
        ScheduleInput {
            time: time.into(),
            frequency: Frequency::Daily,
            duration: 30,
            active,
        }
    }

    // -- Schedules ----------------------------------------------------------

    #[tokio::test]
    async fn schedules_listed_in_time_order() {
        let db = mem_db().await;
        db.create_schedule(&input("18:00", false)).await.unwrap();
        db.create_schedule(&input("07:00", true)).await.unwrap();
        db.create_schedule(&input("08:00", true)).await.unwrap();

        let times: Vec<String> = db
            .list_schedules()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.time)
            .collect();
        assert_eq!(times, vec!["07:00", "08:00", "18:00"]);
    }

    #[tokio::test]
    async fn update_schedule_merges_partial_fields() {
        let db = mem_db().await;
        let created = db.create_schedule(&input("07:00", true)).await.unwrap();

        let patch = SchedulePatch {
            active: Some(false),
            duration: Some(120),
            ..Default::default()
        };
        let updated = db.update_schedule(&created.id, &patch).await.unwrap().unwrap();

        assert_eq!(updated.time, "07:00");
        assert_eq!(updated.duration, 120);
        assert!(!updated.active);

        let stored = db.get_schedule(&created.id).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn update_unknown_schedule_returns_none() {
        let db = mem_db().await;
        let res = db
            .update_schedule("missing", &SchedulePatch::default())
            .await
            .unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn delete_schedule_reports_whether_it_existed() {
        let db = mem_db().await;
        let created = db.create_schedule(&input("07:00", true)).await.unwrap();
        assert!(db.delete_schedule(&created.id).await.unwrap());
        assert!(!db.delete_schedule(&created.id).await.unwrap());
        assert_eq!(db.count_schedules().await.unwrap(), 0);
    }

    // -- Watering logs ------------------------------------------------------

    #[tokio::test]
    async fn log_lifecycle_running_then_closed_once() {
        let db = mem_db().await;
        let start = datetime!(2026-05-01 07:00:00 UTC);
        let id = db
            .append_log(&NewLog {
                kind: WateringKind::Scheduled,
                start_time: start,
                start_moisture: 40,
            })
            .await
            .unwrap();

        assert_eq!(db.running_log_count().await.unwrap(), 1);
        let open = db.get_log(&id).await.unwrap().unwrap();
        assert_eq!(open.status, LogStatus::Running);
        assert_eq!(open.end_time, None);
        assert_eq!(open.duration, None);

        let close = LogClose {
            end_time: datetime!(2026-05-01 07:00:45 UTC),
            end_moisture: 85,
            status: LogStatus::Stopped,
            duration: 45,
        };
        let closed = db.close_log(&id, &close).await.unwrap().unwrap();
        assert_eq!(closed.status, LogStatus::Stopped);
        assert_eq!(closed.end_moisture, Some(85));
        assert_eq!(closed.duration, Some(45));
        assert_eq!(db.running_log_count().await.unwrap(), 0);

        // A second close must not rewrite the record.
        let again = LogClose {
            status: LogStatus::Completed,
            ..close
        };
        assert!(db.close_log(&id, &again).await.unwrap().is_none());
        let stored = db.get_log(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, LogStatus::Stopped);
    }

    #[tokio::test]
    async fn close_unknown_log_returns_none() {
        let db = mem_db().await;
        let close = LogClose {
            end_time: OffsetDateTime::now_utc(),
            end_moisture: 1,
            status: LogStatus::Completed,
            duration: 1,
        };
        assert!(db.close_log("nope", &close).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_logs_newest_first_and_bounded() {
        let db = mem_db().await;
        for minute in 0..5u8 {
            db.append_log(&NewLog {
                kind: WateringKind::Manual,
                start_time: datetime!(2026-05-01 07:00:00 UTC) + time::Duration::minutes(minute as i64),
                start_moisture: minute as i64,
            })
            .await
            .unwrap();
        }

        let logs = db.recent_logs(3).await.unwrap();
        let moistures: Vec<i64> = logs.iter().map(|l| l.start_moisture).collect();
        assert_eq!(moistures, vec![4, 3, 2]);
    }

    #[test]
    fn log_record_serializes_type_field() {
        let rec = WateringLogRecord {
            id: "x".into(),
            kind: WateringKind::Manual,
            start_time: datetime!(2026-05-01 07:00:00 UTC),
            end_time: None,
            start_moisture: 60,
            end_moisture: None,
            status: LogStatus::Running,
            duration: None,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "manual");
        assert_eq!(json["status"], "running");
        assert_eq!(json["startMoisture"], 60);
        assert!(json["endTime"].is_null());
    }

    // -- Readings -----------------------------------------------------------

    #[tokio::test]
    async fn readings_are_pruned_to_retention() {
        let db = mem_db().await;
        for i in 0..10 {
            db.append_reading(&NewReading {
                moisture_level: i,
                temperature: 24,
                humidity: 60,
                light_level: LightLevel::High,
                timestamp: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        }

        assert_eq!(db.prune_readings(4).await.unwrap(), 6);
        let kept: Vec<i64> = db
            .recent_readings(100)
            .await
            .unwrap()
            .iter()
            .map(|r| r.moisture_level)
            .collect();
        assert_eq!(kept, vec![9, 8, 7, 6]);
        assert_eq!(db.latest_reading().await.unwrap().unwrap().moisture_level, 9);
    }

    #[tokio::test]
    async fn closed_pool_surfaces_errors() {
        let db = mem_db().await;
        db.close().await;
        assert!(db.list_schedules().await.is_err());
        assert!(db
            .append_log(&NewLog {
                kind: WateringKind::Manual,
                start_time: OffsetDateTime::now_utc(),
                start_moisture: 1,
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn orphaned_running_logs_are_stopped() {
        let db = mem_db().await;
        let start = datetime!(2026-05-01 07:00:00 UTC);
        let id = db
            .append_log(&NewLog {
                kind: WateringKind::Scheduled,
                start_time: start,
                start_moisture: 70,
            })
            .await
            .unwrap();

        let now = datetime!(2026-05-01 07:02:30 UTC);
        assert_eq!(db.stop_orphaned_logs(now).await.unwrap(), 1);
        assert_eq!(db.running_log_count().await.unwrap(), 0);

        let log = db.get_log(&id).await.unwrap().unwrap();
        assert_eq!(log.status, LogStatus::Stopped);
        assert_eq!(log.end_time, Some(now));
        assert_eq!(log.end_moisture, Some(70));
        assert_eq!(log.duration, Some(150));

        // closed logs are left alone
        assert_eq!(db.stop_orphaned_logs(now).await.unwrap(), 0);
    }

    #[test]
    fn frequency_text_round_trip_matches_serde() {
        assert_eq!("every2days".parse::<Frequency>().unwrap(), Frequency::Every2Days);
        assert_eq!(
            serde_json::to_value(Frequency::Every2Days).unwrap(),
            "every2days"
        );
        assert!("hourly".parse::<Frequency>().is_err());
    }

    #[test]
    fn unix_ms_conversion_keeps_millis() {
        let t = datetime!(2026-05-01 07:00:00.250 UTC);
        assert_eq!(from_unix_ms(to_unix_ms(t)).unwrap(), t);
    }
}
