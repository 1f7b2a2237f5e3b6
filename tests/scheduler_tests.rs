use fieldnode::scheduler::*;

#[test]
fn test_slot_not_due_before_period() {
    let mut scheduler = Scheduler::starting_at(1_000);

    for now in [1_000, 1_500, 2_999] {
        assert!(!scheduler.due(SlotId::Sample, 2_000, now), "fired early at {}", now);
    }
    assert_eq!(scheduler.last_fired(SlotId::Sample), 1_000);
}

#[test]
fn test_slot_fires_on_first_call_past_period() {
    let mut scheduler = Scheduler::starting_at(1_000);

    assert!(scheduler.due(SlotId::Sample, 2_000, 3_000));
    assert_eq!(scheduler.last_fired(SlotId::Sample), 3_000);
    assert_eq!(scheduler.slot(SlotId::Sample).fire_count, 1);

    // Re-armed from the call time, not from the ideal boundary
    assert!(!scheduler.due(SlotId::Sample, 2_000, 4_999));
    assert!(scheduler.due(SlotId::Sample, 2_000, 5_000));
}

#[test]
fn test_late_check_fires_once() {
    let mut scheduler = Scheduler::new();

    // Three periods late: one firing, no burst
    assert!(scheduler.due(SlotId::Report, 20_000, 65_000));
    assert!(!scheduler.due(SlotId::Report, 20_000, 65_001));
    assert_eq!(scheduler.slot(SlotId::Report).fire_count, 1);
    assert_eq!(scheduler.last_fired(SlotId::Report), 65_000);
}

#[test]
fn test_slots_are_independent() {
    let mut scheduler = Scheduler::new();

    let mut sample_fires = 0;
    let mut report_fires = 0;
    for now in (0..=20_000).step_by(2_000) {
        if scheduler.due(SlotId::Sample, 2_000, now) {
            sample_fires += 1;
        }
        if scheduler.due(SlotId::Report, 20_000, now) {
            report_fires += 1;
        }
    }

    assert_eq!(sample_fires, 10);
    assert_eq!(report_fires, 1);

    let stats = scheduler.get_stats();
    assert_eq!(stats.total_checks, 22);
    assert_eq!(stats.total_fired, 11);
}
