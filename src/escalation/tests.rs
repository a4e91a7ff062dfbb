//! Tests for the escalation tracker

#[cfg(test)]
mod tests {
    use super::super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 7, 0, 0, 0).unwrap()
    }

    fn hours(h: i64) -> DateTime<Utc> {
        t0() + Duration::hours(h)
    }

    fn config(window_hours: i64, trigger_count: usize) -> EscalationConfig {
        EscalationConfig { window_hours, trigger_count }
    }

    #[test]
    fn test_single_event_does_not_escalate() {
        let mut tracker = EscalationTracker::new(&config(6, 2));
        assert_eq!(tracker.record(hours(0)), 1);
        assert!(!tracker.should_escalate());
    }

    #[test]
    fn test_trigger_count_boundary() {
        let mut tracker = EscalationTracker::new(&config(6, 3));
        tracker.record(hours(0));
        tracker.record(hours(1));
        assert!(!tracker.should_escalate(), "trigger_count - 1 events must not escalate");
        tracker.record(hours(2));
        assert!(tracker.should_escalate(), "trigger_count events must escalate");
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let mut tracker = EscalationTracker::new(&config(6, 2));
        tracker.record(hours(0));
        let count = tracker.record(hours(6));
        assert_eq!(count, 2, "event exactly window_hours old must still count");
        assert!(tracker.should_escalate());
    }

    #[test]
    fn test_old_events_are_pruned() {
        let mut tracker = EscalationTracker::new(&config(6, 2));
        tracker.record(hours(0));
        let count = tracker.record(hours(6) + Duration::seconds(1));
        assert_eq!(count, 1);
        assert!(!tracker.should_escalate());
    }

    #[test]
    fn test_window_never_retains_stale_events() {
        let mut tracker = EscalationTracker::new(&config(6, 2));
        let offsets = [0, 1, 3, 8, 9, 20, 21, 22, 40, 47, 48];
        for h in offsets {
            let now = hours(h);
            tracker.record(now);
            assert!(
                tracker.events().iter().all(|t| *t >= now - Duration::hours(6)),
                "stale event retained after record at {}h",
                h
            );
        }
    }

    #[test]
    fn test_out_of_order_event_is_anchored_to_newest() {
        let mut tracker = EscalationTracker::new(&config(6, 2));
        tracker.record(hours(10));
        // Late delivery of an event older than the window
        assert_eq!(tracker.record(hours(2)), 1);
        // Late delivery inside the window still counts
        assert_eq!(tracker.record(hours(5)), 2);
        assert!(tracker.should_escalate());
        assert_eq!(tracker.events(), &[hours(5), hours(10)]);
    }

    #[test]
    fn test_from_events_prunes_and_sorts() {
        let tracker = EscalationTracker::from_events(
            &config(6, 2),
            vec![hours(12), hours(1), hours(9)],
        );
        assert_eq!(tracker.events(), &[hours(9), hours(12)]);
        assert!(tracker.should_escalate());
    }

    #[test]
    fn test_scenario_three_events() {
        // Events at 0h, 2h, 5h with a 6h window and trigger 2
        let mut tracker = EscalationTracker::new(&config(6, 2));
        tracker.record(hours(0));
        assert!(!tracker.should_escalate());
        tracker.record(hours(2));
        assert!(tracker.should_escalate());
        assert_eq!(tracker.record(hours(5)), 3);
    }

    #[test]
    fn test_density() {
        let events = vec![hours(0), hours(20), hours(25), hours(30)];
        assert_eq!(density(&events, hours(27), Duration::hours(6)), 1);
        assert_eq!(density(&events, hours(26), Duration::hours(6)), 2);
        assert_eq!(density(&events, hours(40), Duration::hours(6)), 0);
    }
}
