//! Persistent mode record
//!
//! Every read-decide-write runs in one SQLite transaction whose first
//! statement is a write, so the database write lock is held before the
//! record is read. Concurrent job processes therefore serialize on the
//! lock (waiting up to the busy timeout) and each decides on fresh state.

use super::{ModeEffect, ModeEvent, ModeMachine, ModeRecord, Transition};
use crate::config::Config;
use crate::error::{Result, SentinelError};
use crate::recovery::PausePolicy;
use crate::storage::{self, Database};
use crate::types::{L4Episode, SeverityEvent};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

pub const MODE_KEY: &str = "mode";
pub const PAUSE_POLICY_KEY: &str = "pause_policy";

/// Single owner of the mode record
#[derive(Debug, Clone)]
pub struct ModeStore {
    db: Database,
    machine: ModeMachine,
    base_pause_hours: i64,
}

impl ModeStore {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            machine: ModeMachine::new(config.escalation.clone(), config.pause.clone()),
            base_pause_hours: config.pause.base_pause_hours,
        }
    }

    pub fn machine(&self) -> &ModeMachine {
        &self.machine
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Read the current record. A missing record is NORMAL; a malformed one
    /// is logged and also treated as NORMAL.
    pub async fn current_mode(&self, now: DateTime<Utc>) -> Result<ModeRecord> {
        match self.db.get_state::<ModeRecord>(MODE_KEY).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Ok(ModeRecord::normal(now)),
            Err(SentinelError::InvalidState { key, reason }) => {
                tracing::error!(key = %key, reason = %reason, "Malformed mode record, falling back to NORMAL");
                Ok(ModeRecord::normal(now))
            }
            Err(e) => Err(e),
        }
    }

    /// Apply one event atomically
    pub async fn try_transition(&self, event: ModeEvent) -> Result<Transition> {
        self.transact(&event, None).await
    }

    /// Log a classified event. Level-3 events are logged and applied to the
    /// mode in the same transaction; lower levels are only logged.
    pub async fn record_severity_event(&self, event: &SeverityEvent) -> Result<Option<Transition>> {
        if event.level.is_severe() {
            let transition = self
                .transact(&ModeEvent::SevereNews { at: event.occurred_at }, Some(event))
                .await?;
            Ok(Some(transition))
        } else {
            self.db.insert_severity_event(event).await?;
            Ok(None)
        }
    }

    /// Recovery check at `now`
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Transition> {
        self.transact(&ModeEvent::Sweep { now }, None).await
    }

    /// Claim the halt notification for the running L4 episode.
    /// Returns the episode only to the first caller.
    pub async fn claim_halt_notification(&self) -> Result<Option<L4Episode>> {
        let Some(episode) = self.db.open_episode().await? else {
            return Ok(None);
        };
        if self.db.claim_halt_notification(episode.id).await? {
            Ok(Some(episode))
        } else {
            Ok(None)
        }
    }

    async fn transact(&self, event: &ModeEvent, log: Option<&SeverityEvent>) -> Result<Transition> {
        let at = event.time();
        let mut tx = self.db.pool().begin().await?;

        // Write first: this takes the lock before anything is read.
        let seed = serde_json::to_string(&ModeRecord::normal(at))?;
        storage::seed_state(&mut tx, MODE_KEY, &seed, at).await?;

        let record = read_record(&mut tx, at).await?;
        let pause = self.pause_duration(&mut tx).await?;
        let history = storage::severe_times(
            &mut tx,
            self.machine.history_horizon(event),
            DateTime::<Utc>::MAX_UTC,
        )
        .await?;

        let transition = self.machine.apply(&record, event, &history, pause);

        if let Some(logged) = log {
            storage::insert_event(&mut tx, logged).await?;
        }

        if transition.changed() {
            let json = serde_json::to_string(&transition.after)?;
            storage::write_state(
                &mut tx,
                MODE_KEY,
                &json,
                transition.after.revision,
                transition.after.updated_at,
            )
            .await?;

            for effect in &transition.effects {
                match effect {
                    ModeEffect::EnteredL4 { at, pause_until, .. } => {
                        storage::start_episode(&mut tx, *at, *pause_until).await?;
                    }
                    ModeEffect::PauseExtended { to, .. } => {
                        storage::extend_episode(&mut tx, *to).await?;
                    }
                    ModeEffect::Downgraded { ended_at, .. } => {
                        storage::end_episode(&mut tx, *ended_at).await?;
                    }
                    ModeEffect::EnteredL3 { .. } | ModeEffect::CooledDown { .. } => {}
                }
            }
        }

        tx.commit().await?;
        log_transition(&transition);
        Ok(transition)
    }

    async fn pause_duration(&self, conn: &mut SqliteConnection) -> Result<Duration> {
        let hours = match storage::read_state(conn, PAUSE_POLICY_KEY).await? {
            Some(raw) => match serde_json::from_str::<PausePolicy>(&raw) {
                Ok(policy) if policy.pause_hours > 0 => policy.pause_hours,
                Ok(policy) => {
                    tracing::warn!(hours = policy.pause_hours, "Ignoring non-positive pause policy");
                    self.base_pause_hours
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed pause policy, using base pause");
                    self.base_pause_hours
                }
            },
            None => self.base_pause_hours,
        };
        Ok(Duration::hours(hours))
    }
}

async fn read_record(conn: &mut SqliteConnection, now: DateTime<Utc>) -> Result<ModeRecord> {
    let raw = storage::read_state(conn, MODE_KEY).await?;
    match raw.as_deref().map(serde_json::from_str::<ModeRecord>) {
        Some(Ok(record)) => Ok(record),
        Some(Err(e)) => {
            tracing::error!(error = %e, "Malformed mode record, falling back to NORMAL");
            Ok(ModeRecord::normal(now))
        }
        None => Ok(ModeRecord::normal(now)),
    }
}

fn log_transition(transition: &Transition) {
    for effect in &transition.effects {
        match effect {
            ModeEffect::EnteredL3 { source, at } => {
                tracing::warn!(?source, at = %at, "Mode escalated to L3_WARNING");
            }
            ModeEffect::EnteredL4 { at, pause_until, cluster_size } => {
                tracing::warn!(
                    at = %at,
                    pause_until = %pause_until,
                    cluster_size,
                    "Mode escalated to L4_ACTIVE"
                );
            }
            ModeEffect::PauseExtended { from, to, recent_events } => {
                tracing::warn!(from = %from, to = %to, recent_events, "L4 pause extended");
            }
            ModeEffect::Downgraded { to, observation_until, .. } => {
                tracing::info!(to = %to, observation_until = %observation_until, "L4 pause lifted");
            }
            ModeEffect::CooledDown { at } => {
                tracing::info!(at = %at, "L3 cooled down to NORMAL");
            }
        }
    }
    if !transition.changed() {
        tracing::debug!(mode = %transition.after.mode, "Mode unchanged");
    }
}
