use serde::{Deserialize, Serialize};

pub const SLOT_COUNT: usize = 2;

/// Independent periodic tasks sharing the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotId {
    /// Slow tick: flush, fuel refresh, compose and transmit.
    Report,
    /// Fast tick: refresh current and rain, advance the sample index.
    Sample,
}

impl SlotId {
    pub const ALL: [SlotId; SLOT_COUNT] = [SlotId::Report, SlotId::Sample];

    const fn index(self) -> usize {
        match self {
            SlotId::Report => 0,
            SlotId::Sample => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSlot {
    pub slot_id: SlotId,
    pub last_fired_ms: u64,
    pub fire_count: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_checks: u32,
    pub total_fired: u32,
}

/// Elapsed-time scheduler. Each slot remembers when it last fired and
/// fires again once `period` has passed since then, so a late check
/// yields one firing instead of a burst of catch-up firings.
#[derive(Debug, Clone)]
pub struct Scheduler {
    slots: [TimingSlot; SLOT_COUNT],
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Every slot counts its first period from `now_ms`.
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            slots: SlotId::ALL.map(|slot_id| TimingSlot {
                slot_id,
                last_fired_ms: now_ms,
                fire_count: 0,
            }),
            stats: SchedulerStats::default(),
        }
    }

    /// True (and re-arms the slot at `now_ms`) when at least `period_ms`
    /// has elapsed since the slot last fired.
    pub fn due(&mut self, slot: SlotId, period_ms: u64, now_ms: u64) -> bool {
        self.stats.total_checks = self.stats.total_checks.wrapping_add(1);

        let entry = &mut self.slots[slot.index()];
        if now_ms.saturating_sub(entry.last_fired_ms) < period_ms {
            return false;
        }

        entry.last_fired_ms = now_ms;
        entry.fire_count = entry.fire_count.wrapping_add(1);
        self.stats.total_fired = self.stats.total_fired.wrapping_add(1);
        true
    }

    pub fn slot(&self, slot: SlotId) -> &TimingSlot {
        &self.slots[slot.index()]
    }

    pub fn last_fired(&self, slot: SlotId) -> u64 {
        self.slots[slot.index()].last_fired_ms
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_creation() {
        let scheduler = Scheduler::new();
        for slot in SlotId::ALL {
            assert_eq!(scheduler.last_fired(slot), 0);
            assert_eq!(scheduler.slot(slot).fire_count, 0);
        }
        assert_eq!(scheduler.get_stats().total_fired, 0);
    }

    #[test]
    fn test_fires_exactly_at_period() {
        let mut scheduler = Scheduler::new();
        assert!(!scheduler.due(SlotId::Sample, 2000, 1999));
        assert!(scheduler.due(SlotId::Sample, 2000, 2000));
        assert_eq!(scheduler.last_fired(SlotId::Sample), 2000);
        assert!(!scheduler.due(SlotId::Sample, 2000, 2000));
    }

    #[test]
    fn test_late_check_does_not_burst() {
        let mut scheduler = Scheduler::new();

        // Loop stalled for three periods: one firing, re-armed at the late time
        assert!(scheduler.due(SlotId::Sample, 2000, 6500));
        assert!(!scheduler.due(SlotId::Sample, 2000, 6501));
        assert!(!scheduler.due(SlotId::Sample, 2000, 8499));
        assert!(scheduler.due(SlotId::Sample, 2000, 8500));
        assert_eq!(scheduler.slot(SlotId::Sample).fire_count, 2);
    }

    #[test]
    fn test_slots_are_independent() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.due(SlotId::Sample, 2000, 2000));
        assert!(!scheduler.due(SlotId::Report, 20000, 2000));
        assert_eq!(scheduler.last_fired(SlotId::Report), 0);
        assert!(scheduler.due(SlotId::Report, 20000, 20000));
        assert_eq!(scheduler.last_fired(SlotId::Sample), 2000);
    }
}
