use serde::{Deserialize, Serialize};

pub const DEFAULT_FULL_ECHO_US: f32 = 500.0;
pub const DEFAULT_EMPTY_ECHO_US: f32 = 1200.0;
pub const DEFAULT_TANK_CAPACITY_L: f32 = 12.0;
pub const DEFAULT_PING_SAMPLES: u8 = 5;
pub const MAX_PING_SAMPLES: usize = 16;

/// Two-point calibration of the ultrasonic tank gauge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelCalibration {
    /// Echo duration with the tank full (shortest distance to the surface).
    pub full_echo_us: f32,
    /// Echo duration with the tank empty.
    pub empty_echo_us: f32,
    pub tank_capacity_l: f32,
    /// Pings per measurement; the median is used.
    pub ping_samples: u8,
}

impl Default for FuelCalibration {
    fn default() -> Self {
        Self {
            full_echo_us: DEFAULT_FULL_ECHO_US,
            empty_echo_us: DEFAULT_EMPTY_ECHO_US,
            tank_capacity_l: DEFAULT_TANK_CAPACITY_L,
            ping_samples: DEFAULT_PING_SAMPLES,
        }
    }
}

impl FuelCalibration {
    /// Liters for a median echo duration. Clamped to `[0, tank_capacity_l]`
    /// and non-increasing in `echo_us`.
    pub fn estimate(&self, echo_us: f32) -> f32 {
        if echo_us <= self.full_echo_us {
            self.tank_capacity_l
        } else if echo_us >= self.empty_echo_us {
            0.0
        } else {
            self.tank_capacity_l * (self.empty_echo_us - echo_us)
                / (self.empty_echo_us - self.full_echo_us)
        }
    }
}

/// Median of the positive, finite samples (a zero is a ping that never echoed).
/// Even counts take the upper middle element.
pub fn median(samples: &[f32]) -> Option<f32> {
    let mut valid: heapless::Vec<f32, MAX_PING_SAMPLES> = heapless::Vec::new();
    for &sample in samples.iter().filter(|s| **s > 0.0 && s.is_finite()) {
        if valid.push(sample).is_err() {
            break;
        }
    }
    if valid.is_empty() {
        return None;
    }

    valid.sort_unstable_by(|a, b| a.total_cmp(b));
    Some(valid[valid.len() / 2])
}

/// Last successfully computed fuel level. Only refreshed once per report
/// cycle; between refreshes the previous estimate stands.
#[derive(Debug, Clone)]
pub struct FuelGauge {
    calibration: FuelCalibration,
    level_l: f32,
    last_echo_us: Option<f32>,
}

impl FuelGauge {
    pub fn new(calibration: FuelCalibration) -> Self {
        Self {
            calibration,
            level_l: 0.0,
            last_echo_us: None,
        }
    }

    /// Recompute from a measured echo. A missing echo (zero, negative or not
    /// finite) is not a measurement: the previous level stands and `None` is returned.
    pub fn refresh(&mut self, echo_us: f32) -> Option<f32> {
        if echo_us <= 0.0 || !echo_us.is_finite() {
            return None;
        }
        self.level_l = self.calibration.estimate(echo_us);
        self.last_echo_us = Some(echo_us);
        Some(self.level_l)
    }

    pub fn level(&self) -> f32 {
        self.level_l
    }

    pub fn last_echo_us(&self) -> Option<f32> {
        self.last_echo_us
    }

    pub fn calibration(&self) -> &FuelCalibration {
        &self.calibration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_endpoints() {
        let cal = FuelCalibration::default();
        assert_eq!(cal.estimate(500.0), 12.0);
        assert_eq!(cal.estimate(120.0), 12.0);
        assert_eq!(cal.estimate(1200.0), 0.0);
        assert_eq!(cal.estimate(5000.0), 0.0);
        assert_eq!(cal.estimate(850.0), 6.0);
    }

    #[test]
    fn test_median_ignores_missed_pings() {
        let pings = [900.0, 0.0, 880.0, 910.0, 0.0];
        assert_eq!(median(&pings), Some(900.0));
        assert_eq!(median(&[0.0; 5]), None);
    }

    #[test]
    fn test_gauge_keeps_last_level() {
        let mut gauge = FuelGauge::new(FuelCalibration::default());
        assert_eq!(gauge.level(), 0.0);
        assert_eq!(gauge.refresh(850.0), Some(6.0));
        assert_eq!(gauge.level(), 6.0);
        assert_eq!(gauge.last_echo_us(), Some(850.0));
    }

    #[test]
    fn test_missed_echo_keeps_last_level() {
        let mut gauge = FuelGauge::new(FuelCalibration::default());
        gauge.refresh(850.0);

        for echo in [0.0, -1.0, f32::NAN] {
            assert_eq!(gauge.refresh(echo), None);
        }
        assert_eq!(gauge.level(), 6.0);
        assert_eq!(gauge.last_echo_us(), Some(850.0));
    }
}
