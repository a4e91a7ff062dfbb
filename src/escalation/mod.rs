//! Level-3 cluster tracking
//!
//! A single severe headline is noise; several inside a short window are a
//! systemic signal. The tracker keeps the timestamps of level-3 events in a
//! trailing window and reports when the cluster reaches the trigger count.

#[cfg(test)]
mod tests;

use crate::config::EscalationConfig;
use chrono::{DateTime, Duration, Utc};

/// Sliding-window count of level-3 events
#[derive(Debug, Clone)]
pub struct EscalationTracker {
    window: Duration,
    trigger_count: usize,
    /// Sorted ascending
    events: Vec<DateTime<Utc>>,
}

impl EscalationTracker {
    pub fn new(config: &EscalationConfig) -> Self {
        Self {
            window: config.window(),
            trigger_count: config.trigger_count,
            events: Vec::new(),
        }
    }

    /// Rebuild the window from logged event times
    pub fn from_events<I>(config: &EscalationConfig, events: I) -> Self
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let mut tracker = Self::new(config);
        tracker.events = events.into_iter().collect();
        tracker.events.sort();
        tracker.prune();
        tracker
    }

    /// Add an event and drop everything older than the window.
    /// Returns the number of events left in the window.
    pub fn record(&mut self, event_time: DateTime<Utc>) -> usize {
        let pos = self.events.partition_point(|t| *t <= event_time);
        self.events.insert(pos, event_time);
        self.prune();
        self.events.len()
    }

    pub fn should_escalate(&self) -> bool {
        self.events.len() >= self.trigger_count
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[DateTime<Utc>] {
        &self.events
    }

    pub fn trigger_count(&self) -> usize {
        self.trigger_count
    }

    // The window is anchored at the newest event; the boundary is kept.
    fn prune(&mut self) {
        if let Some(newest) = self.events.last().copied() {
            let start = newest - self.window;
            self.events.retain(|t| *t >= start);
        }
    }
}

/// Number of events in `[now - lookback, now]`
pub fn density(events: &[DateTime<Utc>], now: DateTime<Utc>, lookback: Duration) -> usize {
    let start = now - lookback;
    events.iter().filter(|t| **t >= start && **t <= now).count()
}
