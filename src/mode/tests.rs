//! Tests for the mode state machine and its store

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::classifier::Severity;
    use crate::config::Config;
    use crate::storage::Database;
    use crate::types::SeverityEvent;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 7, 0, 0, 0).unwrap()
    }

    fn hours(h: i64) -> DateTime<Utc> {
        t0() + Duration::hours(h)
    }

    fn machine() -> ModeMachine {
        let config = Config::default();
        ModeMachine::new(config.escalation, config.pause)
    }

    fn severe(at: DateTime<Utc>) -> ModeEvent {
        ModeEvent::SevereNews { at }
    }

    fn sweep(now: DateTime<Utc>) -> ModeEvent {
        ModeEvent::Sweep { now }
    }

    /// Feed severe events through the machine the way the store does
    fn run_severe(machine: &ModeMachine, times: &[i64]) -> (ModeRecord, Vec<DateTime<Utc>>, Vec<ModeEffect>) {
        let mut record = ModeRecord::normal(t0());
        let mut log = Vec::new();
        let mut effects = Vec::new();
        for h in times {
            let t = machine.apply(&record, &severe(hours(*h)), &log, Duration::hours(24));
            effects.extend(t.effects.clone());
            record = t.after;
            log.push(hours(*h));
        }
        (record, log, effects)
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(serde_json::to_string(&SystemMode::L4Active).unwrap(), "\"L4_ACTIVE\"");
        assert_eq!(serde_json::to_string(&SystemMode::L3Warning).unwrap(), "\"L3_WARNING\"");
        let mode: SystemMode = serde_json::from_str("\"NORMAL\"").unwrap();
        assert_eq!(mode, SystemMode::Normal);
        assert_eq!(SystemMode::L4Active.to_string(), "L4_ACTIVE");
    }

    #[test]
    fn test_single_severe_event_only_warns() {
        let m = machine();
        let (record, _, effects) = run_severe(&m, &[0]);
        assert_eq!(record.mode, SystemMode::L3Warning);
        assert_eq!(record.pause_until, None);
        assert_eq!(record.l3_source, Some(EscalationSource::News));
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_cluster_enters_l4_on_second_event() {
        let m = machine();
        let (record, _, effects) = run_severe(&m, &[0, 2]);
        assert_eq!(record.mode, SystemMode::L4Active);
        assert_eq!(record.entered_at, hours(2));
        assert_eq!(record.pause_until, Some(hours(26)));
        assert!(record.pause_until.unwrap() > record.entered_at);
        assert!(matches!(effects.last(), Some(ModeEffect::EnteredL4 { cluster_size: 2, .. })));
    }

    #[test]
    fn test_severe_event_in_l4_does_not_move_pause_or_reannounce() {
        let m = machine();
        let (record, _, effects) = run_severe(&m, &[0, 2, 5]);
        assert_eq!(record.mode, SystemMode::L4Active);
        assert_eq!(record.pause_until, Some(hours(26)));
        assert_eq!(record.last_severe_at, Some(hours(5)));
        let announcements = effects
            .iter()
            .filter(|e| matches!(e, ModeEffect::EnteredL4 { .. }))
            .count();
        assert_eq!(announcements, 1);
    }

    #[test]
    fn test_sweep_before_pause_until_is_noop() {
        let m = machine();
        let (record, log, _) = run_severe(&m, &[0, 2]);
        let t = m.apply(&record, &sweep(hours(26)), &log, Duration::hours(24));
        assert!(!t.changed());
        assert!(t.effects.is_empty());
        assert_eq!(t.after.revision, record.revision);
        assert_eq!(t.after.updated_at, record.updated_at);
    }

    #[test]
    fn test_recent_event_extends_pause() {
        let m = machine();
        let (record, mut log, _) = run_severe(&m, &[0, 2]);
        log.push(hours(25));
        let t = m.apply(&record, &sweep(hours(27)), &log, Duration::hours(24));
        assert_eq!(t.after.mode, SystemMode::L4Active);
        assert_eq!(t.after.pause_until, Some(hours(38)));
        assert!(matches!(
            t.effects.as_slice(),
            [ModeEffect::PauseExtended { recent_events: 1, .. }]
        ));
    }

    #[test]
    fn test_late_sweep_extends_past_now_once() {
        let m = machine();
        let (record, mut log, _) = run_severe(&m, &[0, 2]);
        log.push(hours(36));
        // Pause ended at 26h; a sweep at 40h lands on 50h, not the stale 38h
        let first = m.apply(&record, &sweep(hours(40)), &log, Duration::hours(24));
        assert_eq!(first.after.mode, SystemMode::L4Active);
        assert_eq!(first.after.pause_until, Some(hours(50)));
        assert!(first.after.pause_until.unwrap() > hours(40));

        let second = m.apply(&first.after, &sweep(hours(40)), &log, Duration::hours(24));
        assert!(!second.changed());
        assert!(second.effects.is_empty());
        assert_eq!(second.after, first.after);
    }

    #[test]
    fn test_quiet_lookback_downgrades_with_observation() {
        let m = machine();
        let (record, log, _) = run_severe(&m, &[0, 2]);
        // Events at 0h and 2h are older than the 24h L3 cooldown at 27h
        let t = m.apply(&record, &sweep(hours(27)), &log, Duration::hours(24));
        assert_eq!(t.after.mode, SystemMode::Normal);
        assert_eq!(t.after.pause_until, None);
        assert_eq!(t.after.observation_until, Some(hours(51)));
        assert!(t.after.in_observation(hours(40)));
        assert!(!t.after.in_observation(hours(51)));
        assert!(matches!(
            t.effects.as_slice(),
            [ModeEffect::Downgraded { to: SystemMode::Normal, .. }]
        ));
    }

    #[test]
    fn test_lingering_event_downgrades_to_l3() {
        let m = machine();
        let (record, mut log, _) = run_severe(&m, &[0, 2]);
        // Outside the 6h re-check lookback at 30h but inside the 24h cooldown
        log.push(hours(20));
        let t = m.apply(&record, &sweep(hours(30)), &log, Duration::hours(24));
        assert_eq!(t.after.mode, SystemMode::L3Warning);
        assert_eq!(t.after.observation_until, Some(hours(54)));
    }

    #[test]
    fn test_pause_until_never_decreases_in_l4() {
        let m = machine();
        let (mut record, mut log, _) = run_severe(&m, &[0, 2]);
        let mut last = record.pause_until.unwrap();
        for h in [3, 10, 25, 27, 30, 37, 39, 50] {
            log.push(hours(h - 1));
            for event in [severe(hours(h)), sweep(hours(h))] {
                let t = m.apply(&record, &event, &log, Duration::hours(24));
                record = t.after;
                if record.mode != SystemMode::L4Active {
                    return;
                }
                let current = record.pause_until.unwrap();
                assert!(current >= last, "pause_until moved backwards at {}h", h);
                last = current;
            }
        }
    }

    #[test]
    fn test_l3_cooldown() {
        let m = machine();
        let (record, log, _) = run_severe(&m, &[0]);
        let early = m.apply(&record, &sweep(hours(23)), &log, Duration::hours(24));
        assert!(!early.changed());
        let t = m.apply(&record, &sweep(hours(24)), &log, Duration::hours(24));
        assert_eq!(t.after.mode, SystemMode::Normal);
        assert!(matches!(t.effects.as_slice(), [ModeEffect::CooledDown { .. }]));
    }

    #[test]
    fn test_performance_degradation_never_reaches_l4() {
        let m = machine();
        let record = ModeRecord::normal(t0());
        let event = ModeEvent::PerformanceDegraded { at: hours(1), market: Market::Tw };
        let t = m.apply(&record, &event, &[], Duration::hours(24));
        assert_eq!(t.after.mode, SystemMode::L3Warning);
        assert_eq!(t.after.l3_source, Some(EscalationSource::Performance));

        // Already warned: no change
        let again = m.apply(&t.after, &event, &[], Duration::hours(24));
        assert!(!again.changed());
        assert!(again.effects.is_empty());
    }

    #[test]
    fn test_reapplying_is_idempotent() {
        let m = machine();
        let (record, log, _) = run_severe(&m, &[0, 2]);
        let first = m.apply(&record, &sweep(hours(10)), &log, Duration::hours(24));
        let second = m.apply(&first.after, &sweep(hours(10)), &log, Duration::hours(24));
        assert_eq!(first.after, second.after);
        assert!(second.effects.is_empty());
    }

    #[test]
    fn test_revision_increments_on_change() {
        let m = machine();
        let (record, _, _) = run_severe(&m, &[0, 2]);
        assert_eq!(record.revision, 2);
        assert_eq!(record.updated_at, hours(2));
    }

    // ---- store ----

    async fn open_store(dir: &tempfile::TempDir) -> ModeStore {
        let path = dir.path().join("mode.db");
        let db = Database::connect(path.to_str().unwrap()).await.unwrap();
        ModeStore::new(db, &Config::default())
    }

    fn severity_event(at: DateTime<Utc>, level: Severity) -> SeverityEvent {
        SeverityEvent {
            occurred_at: at,
            symbol: "2330.TW".to_string(),
            market: Some(Market::Tw),
            headline: "test headline".to_string(),
            link: "https://example.com/a".to_string(),
            level,
        }
    }

    #[tokio::test]
    async fn test_missing_record_reads_as_normal() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let record = store.current_mode(t0()).await.unwrap();
        assert_eq!(record.mode, SystemMode::Normal);
        assert_eq!(record.revision, 0);
    }

    #[tokio::test]
    async fn test_malformed_record_falls_back_to_normal() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store
            .database()
            .put_state(store::MODE_KEY, &serde_json::json!({"mode": "PANIC"}), t0())
            .await
            .unwrap();
        let record = store.current_mode(t0()).await.unwrap();
        assert_eq!(record.mode, SystemMode::Normal);
    }

    #[tokio::test]
    async fn test_store_escalates_and_opens_episode() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let first = store
            .record_severity_event(&severity_event(hours(0), Severity::Severe))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.after.mode, SystemMode::L3Warning);
        assert_eq!(first.window_count, Some(1));

        let second = store
            .record_severity_event(&severity_event(hours(2), Severity::Severe))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.after.mode, SystemMode::L4Active);
        assert!(second.is_cluster(2));

        let episode = store.database().open_episode().await.unwrap().unwrap();
        assert_eq!(episode.started_at, hours(2));
        assert_eq!(episode.pause_until, hours(26));

        let persisted = store.current_mode(hours(3)).await.unwrap();
        assert_eq!(persisted, second.after);
    }

    #[tokio::test]
    async fn test_minor_events_are_logged_without_transition() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let result = store
            .record_severity_event(&severity_event(hours(0), Severity::Moderate))
            .await
            .unwrap();
        assert!(result.is_none());
        let logged = store
            .database()
            .severity_events_between(hours(-1), hours(1), Severity::Minor)
            .await
            .unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(store.current_mode(hours(1)).await.unwrap().mode, SystemMode::Normal);
    }

    #[tokio::test]
    async fn test_pause_policy_record_sets_pause() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let policy = crate::recovery::PausePolicy {
            pause_hours: 48,
            reason: "severe_drawdown".to_string(),
            based_on: Some(-0.05),
            updated_at: t0(),
        };
        store
            .database()
            .put_state(store::PAUSE_POLICY_KEY, &policy, t0())
            .await
            .unwrap();

        for h in [0, 1] {
            store
                .record_severity_event(&severity_event(hours(h), Severity::Severe))
                .await
                .unwrap();
        }
        let record = store.current_mode(hours(2)).await.unwrap();
        assert_eq!(record.pause_until, Some(hours(49)));
    }

    #[tokio::test]
    async fn test_halt_notification_claimed_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        for h in [0, 1] {
            store
                .record_severity_event(&severity_event(hours(h), Severity::Severe))
                .await
                .unwrap();
        }
        assert!(store.claim_halt_notification().await.unwrap().is_some());
        assert!(store.claim_halt_notification().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_closes_episode() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        for h in [0, 1] {
            store
                .record_severity_event(&severity_event(hours(h), Severity::Severe))
                .await
                .unwrap();
        }
        let t = store.sweep(hours(30)).await.unwrap();
        assert_eq!(t.after.mode, SystemMode::Normal);
        assert!(store.database().open_episode().await.unwrap().is_none());
        let closed = store.database().closed_episodes().await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].ended_at, Some(hours(30)));

        // A second sweep at the same time changes nothing
        let again = store.sweep(hours(30)).await.unwrap();
        assert!(!again.changed());
        assert_eq!(again.after.revision, t.after.revision);
    }
}
