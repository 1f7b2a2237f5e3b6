use crate::hal::Buzzer;

/// Pattern played after boot and after every transmission.
pub const HEARTBEAT_ALERT: (u32, u8) = (133, 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    On,
    Off,
}

/// Non-blocking on/off pulse train for the buzzer. `tick` is called every
/// loop pass and flips the output whenever the current half-period has elapsed.
#[derive(Debug, Clone)]
pub struct AlertSequencer {
    phase: Phase,
    on_ms: u32,
    remaining: u8,
    phase_started_ms: u64,
    played: u32,
}

impl AlertSequencer {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            on_ms: 0,
            remaining: 0,
            phase_started_ms: 0,
            played: 0,
        }
    }

    /// Start `beeps` pulses of `on_ms` on / `on_ms` off. Restarts a running pattern.
    pub fn start<B: Buzzer + ?Sized>(&mut self, on_ms: u32, beeps: u8, now_ms: u64, buzzer: &mut B) {
        if beeps == 0 || on_ms == 0 {
            self.stop(buzzer);
            return;
        }

        self.on_ms = on_ms;
        self.remaining = beeps;
        self.phase = Phase::On;
        self.phase_started_ms = now_ms;
        self.played = self.played.wrapping_add(1);
        buzzer.set(true);
    }

    /// Passes every half-period that has elapsed, so a late call catches up
    /// instead of stretching the pattern.
    pub fn tick<B: Buzzer + ?Sized>(&mut self, now_ms: u64, buzzer: &mut B) {
        let half_period = u64::from(self.on_ms);
        while self.phase != Phase::Idle
            && now_ms.saturating_sub(self.phase_started_ms) >= half_period
        {
            self.phase_started_ms += half_period;
            match self.phase {
                Phase::On => {
                    buzzer.set(false);
                    self.phase = Phase::Off;
                }
                Phase::Off => {
                    self.remaining = self.remaining.saturating_sub(1);
                    if self.remaining == 0 {
                        self.phase = Phase::Idle;
                    } else {
                        buzzer.set(true);
                        self.phase = Phase::On;
                    }
                }
                Phase::Idle => {}
            }
        }
    }

    pub fn stop<B: Buzzer + ?Sized>(&mut self, buzzer: &mut B) {
        if self.phase == Phase::On {
            buzzer.set(false);
        }
        self.phase = Phase::Idle;
        self.remaining = 0;
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn remaining_beeps(&self) -> u8 {
        self.remaining
    }

    pub fn alerts_played(&self) -> u32 {
        self.played
    }
}

impl Default for AlertSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Line {
        on: bool,
        edges: u32,
    }

    impl Buzzer for Line {
        fn set(&mut self, on: bool) {
            if on != self.on {
                self.edges += 1;
            }
            self.on = on;
        }
    }

    #[test]
    fn test_plays_requested_pulses() {
        let mut alert = AlertSequencer::new();
        let mut line = Line::default();

        alert.start(100, 2, 0, &mut line);
        assert!(line.on);

        let mut now = 0;
        while alert.is_active() {
            now += 10;
            alert.tick(now, &mut line);
            assert!(now <= 1_000, "alert never finished");
        }

        // on, off, on, off
        assert_eq!(line.edges, 4);
        assert!(!line.on);
        assert_eq!(now, 400);
    }

    #[test]
    fn test_late_tick_catches_up() {
        let mut alert = AlertSequencer::new();
        let mut line = Line::default();

        let (on_ms, beeps) = HEARTBEAT_ALERT;
        alert.start(on_ms, beeps, 0, &mut line);
        alert.tick(2_000, &mut line);
        assert!(!alert.is_active());
        assert!(!line.on);
        assert_eq!(line.edges, 8);
    }

    #[test]
    fn test_stop_silences_immediately() {
        let mut alert = AlertSequencer::new();
        let mut line = Line::default();

        alert.start(750, 10, 0, &mut line);
        alert.stop(&mut line);
        assert!(!alert.is_active());
        assert!(!line.on);
    }

    #[test]
    fn test_zero_beeps_is_noop() {
        let mut alert = AlertSequencer::new();
        let mut line = Line::default();
        alert.start(100, 0, 0, &mut line);
        assert!(!alert.is_active());
        assert_eq!(line.edges, 0);
    }
}
