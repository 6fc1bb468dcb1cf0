//! The watering coordinator: single owner of the live garden state.
//!
//! Viewer commands, the per-session watering ticker, the sensor loop and the
//! schedule loop all funnel through one [`Coordinator`].  Every mutation runs
//! while holding the core lock, including the store write it causes and the
//! events it emits, so viewers observe events in commit order and no two
//! mutations interleave.
//!
//! Methods ending in `_at` take the current time explicitly and never spawn
//! anything; the plain variants read the clock and also drive the watering
//! ticker for a session they start.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{Config, StorageSettings, WateringSettings};
use crate::db::{Db, NewLog, NewReading, WateringKind};
use crate::error::Result;
use crate::hub::{Hub, SubscriberId, Subscription, SUBSCRIBER_QUEUE};
use crate::protocol::Event;
use crate::scheduler::{self, Matcher};
use crate::sensors::SensorSimulator;
use crate::session::{self, WateringSession};
use crate::state::{SystemState, SystemStatus};

/// Outcome of a state-machine command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Not valid in the current state; nothing changed.
    Ignored,
}

/// What the watering ticker should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The session this ticker belongs to is over.
    Finished,
}

struct Core {
    state: SystemState,
    session: Option<WateringSession>,
    hub: Hub,
    matcher: Matcher,
    sim: SensorSimulator,
}

impl Core {
    fn broadcast_status(&mut self) {
        let event = Event::SystemStatus(self.state.to_status());
        self.hub.broadcast(&event);
    }
}

#[derive(Clone)]
pub struct Coordinator {
    core: Arc<Mutex<Core>>,
    db: Db,
    clock: Clock,
    watering: WateringSettings,
    storage: StorageSettings,
}

impl Coordinator {
    pub fn new(db: Db, config: &Config, clock: Clock) -> Self {
        let sim = SensorSimulator::new(config.sensors.clone());
        Self::with_simulator(db, config, clock, sim)
    }

    pub fn with_simulator(db: Db, config: &Config, clock: Clock, sim: SensorSimulator) -> Self {
        let core = Core {
            state: SystemState::new(config.watering.initial_moisture, config.sensors.light_level),
            session: None,
            hub: Hub::new(SUBSCRIBER_QUEUE),
            matcher: Matcher::default(),
            sim,
        };

        Self {
            core: Arc::new(Mutex::new(core)),
            db,
            clock,
            watering: config.watering.clone(),
            storage: config.storage.clone(),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn log_limit(&self) -> i64 {
        self.storage.log_limit
    }

    pub fn reading_limit(&self) -> i64 {
        self.storage.reading_limit
    }

    // ----------------------------
    // Queries
    // ----------------------------

    pub async fn status(&self) -> SystemStatus {
        self.core.lock().await.state.to_status()
    }

    #[cfg(test)]
    pub async fn active_session(&self) -> Option<WateringSession> {
        self.core.lock().await.session.clone()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.core.lock().await.hub.len()
    }

    // ----------------------------
    // Viewers
    // ----------------------------

    /// Register a viewer.  Its first event is the current `system_status`,
    /// queued before any later mutation can emit.
    pub async fn subscribe(&self) -> Subscription {
        let mut core = self.core.lock().await;
        let snapshot = Event::SystemStatus(core.state.to_status());
        core.hub.subscribe(snapshot)
    }

    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.core.lock().await.hub.unsubscribe(id);
    }

    /// Send an event to a single viewer.
    pub async fn reply(&self, id: SubscriberId, event: Event) -> bool {
        self.core.lock().await.hub.send_to(id, event)
    }

    /// Send the current status to a single viewer.
    pub async fn reply_status(&self, id: SubscriberId) -> bool {
        let mut core = self.core.lock().await;
        let event = Event::SystemStatus(core.state.to_status());
        core.hub.send_to(id, event)
    }

    // ----------------------------
    // Watering session
    // ----------------------------

    /// Start a session now and drive it with the watering ticker.
    pub async fn start_watering(&self, kind: WateringKind) -> Result<Transition> {
        let now = OffsetDateTime::now_utc();
        let started = {
            let mut core = self.core.lock().await;
            self.begin_locked(&mut core, kind, now).await?
        };
        Ok(self.drive(started))
    }

    #[cfg(test)]
    pub async fn start_watering_at(&self, kind: WateringKind, now: OffsetDateTime) -> Result<Transition> {
        let mut core = self.core.lock().await;
        let started = self.begin_locked(&mut core, kind, now).await?;
        Ok(if started.is_some() {
            Transition::Applied
        } else {
            Transition::Ignored
        })
    }

    /// Explicit stop requested by a viewer.
    pub async fn stop_watering(&self) -> Result<Transition> {
        self.stop_watering_at(false, OffsetDateTime::now_utc()).await
    }

    pub async fn stop_watering_at(&self, completed: bool, now: OffsetDateTime) -> Result<Transition> {
        let mut core = self.core.lock().await;
        self.finish_locked(&mut core, completed, now).await
    }

    /// One watering tick for `session_id`.  A tick for a session that is no
    /// longer open changes nothing and reports `Finished`.
    pub async fn tick_watering_at(&self, session_id: &str, now: OffsetDateTime) -> Result<TickOutcome> {
        let mut core = self.core.lock().await;

        let session = match &core.session {
            Some(s) if s.id == session_id => s.clone(),
            _ => return Ok(TickOutcome::Finished),
        };

        let target = self.watering.target_moisture;
        core.state.moisture = (core.state.moisture + self.watering.moisture_step).min(100.0);
        core.broadcast_status();

        let report = session.progress_report(now, core.state.moisture, target);
        core.hub.broadcast(&Event::WateringProgress(report));

        if core.state.moisture >= target {
            self.finish_locked(&mut core, true, now).await?;
            return Ok(TickOutcome::Finished);
        }
        Ok(TickOutcome::Continue)
    }

    async fn begin_locked(
        &self,
        core: &mut Core,
        kind: WateringKind,
        now: OffsetDateTime,
    ) -> Result<Option<String>> {
        if let Some(open) = &core.session {
            debug!(requested = %kind, running = %open.kind, "start ignored, session already running");
            return Ok(None);
        }

        let start_moisture = core.state.moisture_level();
        let id = self
            .db
            .append_log(&NewLog {
                kind,
                start_time: now,
                start_moisture: i64::from(start_moisture),
            })
            .await?;

        core.session = Some(WateringSession {
            id: id.clone(),
            kind,
            start_time: now,
            start_moisture,
        });
        core.state.is_watering = true;

        info!(%kind, moisture = start_moisture, log = %id, "watering started");

        core.broadcast_status();
        core.hub
            .broadcast(&Event::Notification(session::started_notice(kind)));

        Ok(Some(id))
    }

    /// Close the open session.  The state only flips to idle once its log is
    /// closed, so a store failure leaves the session running.
    async fn finish_locked(
        &self,
        core: &mut Core,
        completed: bool,
        now: OffsetDateTime,
    ) -> Result<Transition> {
        let Some(open) = &core.session else {
            debug!("stop ignored, no session running");
            return Ok(Transition::Ignored);
        };

        let end_moisture = core.state.moisture_level();
        let close = open.closing(now, end_moisture, completed);
        let log_id = open.id.clone();

        if self.db.close_log(&log_id, &close).await?.is_none() {
            warn!(log = %log_id, "open watering log missing or already closed");
        }

        core.session = None;
        core.state.is_watering = false;

        info!(
            log = %log_id,
            status = %close.status,
            moisture = end_moisture,
            duration_sec = close.duration,
            "watering finished"
        );

        core.broadcast_status();
        core.hub.broadcast(&Event::Notification(session::finished_notice(
            completed,
            end_moisture,
        )));

        Ok(Transition::Applied)
    }

    /// Spawn the watering ticker for a session that was just started.
    fn drive(&self, started: Option<String>) -> Transition {
        match started {
            Some(id) => {
                self.spawn_ticker(id);
                Transition::Applied
            }
            None => Transition::Ignored,
        }
    }

    /// Ticks `session_id` every watering interval until the session ends.
    pub(crate) fn spawn_ticker(&self, session_id: String) -> JoinHandle<()> {
        let coordinator = self.clone();
        let period = Duration::from_millis(self.watering.tick_ms);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match coordinator
                    .tick_watering_at(&session_id, OffsetDateTime::now_utc())
                    .await
                {
                    Ok(TickOutcome::Continue) => {}
                    Ok(TickOutcome::Finished) => break,
                    // Session stays open; the next tick retries the close.
                    Err(e) => error!(session = %session_id, "watering tick failed: {e}"),
                }
            }
            debug!(session = %session_id, "watering ticker stopped");
        })
    }

    // ----------------------------
    // Sensors
    // ----------------------------

    /// One sensor tick.  The new values are broadcast even if storing the
    /// reading fails; the failure is returned to the caller.
    pub async fn sample_sensors_at(&self, now: OffsetDateTime) -> Result<()> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        let reading = core.sim.sample(&mut core.state, now);
        let stored = self.store_reading(&reading).await;
        core.broadcast_status();
        stored
    }

    async fn store_reading(&self, reading: &NewReading) -> Result<()> {
        self.db.append_reading(reading).await?;
        let pruned = self.db.prune_readings(self.storage.reading_retention).await?;
        if pruned > 0 {
            debug!(pruned, "old sensor readings pruned");
        }
        Ok(())
    }

    // ----------------------------
    // Schedules
    // ----------------------------

    /// Check the schedule store against the current minute and start a
    /// scheduled session if one is due.
    pub async fn check_schedules(&self) -> Result<Transition> {
        let now = self.clock.now();
        let started = {
            let mut core = self.core.lock().await;
            self.match_locked(&mut core, now).await?
        };
        Ok(self.drive(started))
    }

    #[cfg(test)]
    pub async fn check_schedules_at(&self, now: OffsetDateTime) -> Result<Transition> {
        let mut core = self.core.lock().await;
        let started = self.match_locked(&mut core, now).await?;
        Ok(if started.is_some() {
            Transition::Applied
        } else {
            Transition::Ignored
        })
    }

    async fn match_locked(&self, core: &mut Core, now: OffsetDateTime) -> Result<Option<String>> {
        if core.session.is_some() || core.matcher.fired_in(now) {
            return Ok(None);
        }

        let entries = self.db.list_schedules().await?;
        let due = scheduler::due_entries(&entries, now);
        if due.is_empty() {
            return Ok(None);
        }

        debug!(
            minute = %scheduler::hhmm(now),
            due = due.len(),
            "schedule entries due"
        );

        let started = self.begin_locked(core, WateringKind::Scheduled, now).await?;
        if started.is_some() {
            core.matcher.mark(now);
        }
        Ok(started)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
