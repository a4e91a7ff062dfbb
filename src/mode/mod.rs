//! System risk mode
//!
//! ```text
//!            severe news                 cluster >= trigger
//!  NORMAL ───────────────> L3_WARNING ─────────────────────> L4_ACTIVE
//!    ^  ^  perf. degraded      │  ^                              │
//!    │  └──────────────────────┘  │  sweep after pause_until,    │
//!    │        cooldown elapsed    │  quiet lookback              │
//!    └────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! `ModeMachine` is the pure transition function. `ModeStore` owns the one
//! persisted record and applies transitions under the database write lock.

pub mod store;
#[cfg(test)]
mod tests;

pub use store::ModeStore;

use crate::config::{EscalationConfig, PauseConfig};
use crate::escalation::{density, EscalationTracker};
use crate::types::Market;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemMode {
    Normal,
    L3Warning,
    L4Active,
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SystemMode::Normal => "NORMAL",
            SystemMode::L3Warning => "L3_WARNING",
            SystemMode::L4Active => "L4_ACTIVE",
        })
    }
}

/// What raised the current L3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationSource {
    News,
    Performance,
}

/// The authoritative mode record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRecord {
    pub mode: SystemMode,
    pub entered_at: DateTime<Utc>,
    /// Present exactly while in L4
    pub pause_until: Option<DateTime<Utc>>,
    /// Reduced-risk period after leaving L4
    pub observation_until: Option<DateTime<Utc>>,
    pub last_severe_at: Option<DateTime<Utc>>,
    pub l3_source: Option<EscalationSource>,
    /// Incremented on every committed change
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl ModeRecord {
    pub fn normal(at: DateTime<Utc>) -> Self {
        Self {
            mode: SystemMode::Normal,
            entered_at: at,
            pause_until: None,
            observation_until: None,
            last_severe_at: None,
            l3_source: None,
            revision: 0,
            updated_at: at,
        }
    }

    pub fn in_observation(&self, now: DateTime<Utc>) -> bool {
        self.observation_until.map(|until| now < until).unwrap_or(false)
    }

    /// Same state, ignoring bookkeeping fields
    fn same_state(&self, other: &ModeRecord) -> bool {
        self.mode == other.mode
            && self.entered_at == other.entered_at
            && self.pause_until == other.pause_until
            && self.observation_until == other.observation_until
            && self.last_severe_at == other.last_severe_at
            && self.l3_source == other.l3_source
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum ModeEvent {
    /// A level-3 headline at `at`
    SevereNews { at: DateTime<Utc> },
    /// The hit-rate guard saw sustained deterioration
    PerformanceDegraded { at: DateTime<Utc>, market: Market },
    /// Periodic recovery check
    Sweep { now: DateTime<Utc> },
}

impl ModeEvent {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            ModeEvent::SevereNews { at } => *at,
            ModeEvent::PerformanceDegraded { at, .. } => *at,
            ModeEvent::Sweep { now } => *now,
        }
    }
}

/// Side effects owed by the writer that committed a transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ModeEffect {
    EnteredL3 { source: EscalationSource, at: DateTime<Utc> },
    EnteredL4 { at: DateTime<Utc>, pause_until: DateTime<Utc>, cluster_size: usize },
    PauseExtended { from: DateTime<Utc>, to: DateTime<Utc>, recent_events: usize },
    Downgraded {
        to: SystemMode,
        l4_started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        observation_until: DateTime<Utc>,
    },
    CooledDown { at: DateTime<Utc> },
}

/// Result of applying one event
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub before: ModeRecord,
    pub after: ModeRecord,
    pub effects: Vec<ModeEffect>,
    /// Level-3 events in the escalation window, for severe news only
    pub window_count: Option<usize>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }

    /// The severe event formed a cluster at or above the trigger count
    pub fn is_cluster(&self, trigger_count: usize) -> bool {
        self.window_count.map(|c| c >= trigger_count).unwrap_or(false)
    }
}

/// Pure transition function
#[derive(Debug, Clone)]
pub struct ModeMachine {
    escalation: EscalationConfig,
    pause: PauseConfig,
}

impl ModeMachine {
    pub fn new(escalation: EscalationConfig, pause: PauseConfig) -> Self {
        Self { escalation, pause }
    }

    pub fn escalation(&self) -> &EscalationConfig {
        &self.escalation
    }

    /// How far back `apply` needs the level-3 history from `event`
    pub fn history_horizon(&self, event: &ModeEvent) -> DateTime<Utc> {
        let hours = self
            .escalation
            .window_hours
            .max(self.pause.recheck_lookback_hours)
            .max(self.pause.l3_cooldown_hours);
        event.time() - Duration::hours(hours)
    }

    /// Apply `event` to `record`.
    ///
    /// `severe_history` holds logged level-3 times (excluding the event being
    /// applied). `pause` is the L4 duration to use if L4 is entered.
    pub fn apply(
        &self,
        record: &ModeRecord,
        event: &ModeEvent,
        severe_history: &[DateTime<Utc>],
        pause: Duration,
    ) -> Transition {
        let mut next = record.clone();
        let mut effects = Vec::new();
        let mut window_count = None;

        match event {
            ModeEvent::SevereNews { at } => {
                let at = *at;
                let mut tracker = EscalationTracker::from_events(
                    &self.escalation,
                    severe_history.iter().copied(),
                );
                window_count = Some(tracker.record(at));
                next.last_severe_at = Some(next.last_severe_at.map_or(at, |t| t.max(at)));

                if next.mode == SystemMode::Normal {
                    next.mode = SystemMode::L3Warning;
                    next.entered_at = at;
                    next.l3_source = Some(EscalationSource::News);
                    effects.push(ModeEffect::EnteredL3 { source: EscalationSource::News, at });
                }

                if next.mode == SystemMode::L3Warning && tracker.should_escalate() {
                    let pause_until = at + pause;
                    next.mode = SystemMode::L4Active;
                    next.entered_at = at;
                    next.pause_until = Some(pause_until);
                    next.observation_until = None;
                    effects.push(ModeEffect::EnteredL4 {
                        at,
                        pause_until,
                        cluster_size: tracker.len(),
                    });
                }
            }

            ModeEvent::PerformanceDegraded { at, market } => {
                if next.mode == SystemMode::Normal {
                    tracing::warn!(market = %market, "Hit rate deterioration raises L3");
                    next.mode = SystemMode::L3Warning;
                    next.entered_at = *at;
                    next.l3_source = Some(EscalationSource::Performance);
                    effects.push(ModeEffect::EnteredL3 {
                        source: EscalationSource::Performance,
                        at: *at,
                    });
                }
            }

            ModeEvent::Sweep { now } => {
                let now = *now;
                match next.mode {
                    SystemMode::L4Active => self.sweep_l4(&mut next, &mut effects, severe_history, now),
                    SystemMode::L3Warning => self.sweep_l3(&mut next, &mut effects, severe_history, now),
                    SystemMode::Normal => {}
                }
            }
        }

        if !next.same_state(record) {
            next.revision = record.revision + 1;
            next.updated_at = event.time().max(record.updated_at);
        }

        Transition {
            before: record.clone(),
            after: next,
            effects,
            window_count,
        }
    }

    fn sweep_l4(
        &self,
        next: &mut ModeRecord,
        effects: &mut Vec<ModeEffect>,
        severe_history: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) {
        let Some(pause_until) = next.pause_until else {
            // L4 without a pause deadline cannot be reasoned about; end it now.
            tracing::error!("L4 record without pause_until, treating the pause as elapsed");
            self.downgrade(next, effects, severe_history, now);
            return;
        };
        if now <= pause_until {
            return;
        }

        let recent = density(
            severe_history,
            now,
            Duration::hours(self.pause.recheck_lookback_hours),
        );
        if recent >= self.pause.recheck_min_events {
            // Whole steps until the deadline lies after `now`
            let step = Duration::hours(self.pause.extension_hours.max(1));
            let mut extended = pause_until + step;
            while extended <= now {
                extended += step;
            }
            next.pause_until = Some(extended);
            effects.push(ModeEffect::PauseExtended {
                from: pause_until,
                to: extended,
                recent_events: recent,
            });
        } else {
            self.downgrade(next, effects, severe_history, now);
        }
    }

    fn downgrade(
        &self,
        next: &mut ModeRecord,
        effects: &mut Vec<ModeEffect>,
        severe_history: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) {
        let lingering = density(
            severe_history,
            now,
            Duration::hours(self.pause.l3_cooldown_hours),
        );
        let to = if lingering > 0 {
            SystemMode::L3Warning
        } else {
            SystemMode::Normal
        };
        let observation_until = now + Duration::hours(self.pause.observation_hours);

        effects.push(ModeEffect::Downgraded {
            to,
            l4_started_at: next.entered_at,
            ended_at: now,
            observation_until,
        });

        next.mode = to;
        next.entered_at = now;
        next.pause_until = None;
        next.observation_until = Some(observation_until);
        next.l3_source = if to == SystemMode::L3Warning {
            Some(EscalationSource::News)
        } else {
            None
        };
    }

    fn sweep_l3(
        &self,
        next: &mut ModeRecord,
        effects: &mut Vec<ModeEffect>,
        severe_history: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) {
        let cooldown = Duration::hours(self.pause.l3_cooldown_hours);
        let anchor = match next.last_severe_at {
            Some(last) => next.entered_at.max(last),
            None => next.entered_at,
        };
        if now - anchor < cooldown {
            return;
        }
        if severe_history.iter().any(|t| *t > now - cooldown && *t <= now) {
            return;
        }
        next.mode = SystemMode::Normal;
        next.entered_at = now;
        next.l3_source = None;
        effects.push(ModeEffect::CooledDown { at: now });
    }
}
