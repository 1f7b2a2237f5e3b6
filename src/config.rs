use crate::fuel::{FuelCalibration, MAX_PING_SAMPLES};
use crate::sampling::{TieBreak, MAX_SAMPLE_CAPACITY};
use crate::protocol::{min_report_len, MAX_INBOUND_PAYLOAD_SIZE, MAX_OUTBOUND_SIZE};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;

// Build-time defaults for the deployed node
pub const DEFAULT_SAMPLING_PERIOD_MS: u64 = 2_000;
pub const DEFAULT_REPORTING_PERIOD_MS: u64 = 20_000;
pub const DEFAULT_BUFFER_MARGIN: usize = 3;

pub const DEFAULT_RMS_CROSSINGS: u32 = 20;
pub const DEFAULT_RMS_TIMEOUT_MS: u32 = 1_000;

pub const DEFAULT_RAIN_THRESHOLD_VOLTS: f32 = 2.5;
pub const DEFAULT_ADC_REFERENCE_VOLTS: f32 = 5.0;
pub const DEFAULT_ADC_BITS: u8 = 10;

pub const DEFAULT_DEVICE_ID: u32 = 20009;
pub const DEFAULT_CLASS_DIGITS: u8 = 4;
pub const DEFAULT_MAX_ID_DIGITS: usize = 6;
pub const DEFAULT_MAX_INBOUND_PAYLOAD: usize = 100;
pub const DEFAULT_MAX_OUTBOUND_LEN: usize = 200;

// ceil(20 s / 2 s) + 3 must fit the compiled sample buffers
const_assert!(
    (DEFAULT_REPORTING_PERIOD_MS / DEFAULT_SAMPLING_PERIOD_MS) as usize + DEFAULT_BUFFER_MARGIN
        <= MAX_SAMPLE_CAPACITY
);
const_assert!(DEFAULT_MAX_OUTBOUND_LEN <= MAX_OUTBOUND_SIZE);
const_assert!(DEFAULT_MAX_INBOUND_PAYLOAD <= MAX_INBOUND_PAYLOAD_SIZE);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid JSON configuration: {0}")]
    Parse(String),
    #[error("{0} period must be non-zero")]
    ZeroPeriod(&'static str),
    #[error("reporting period {reporting_ms} ms is shorter than sampling period {sampling_ms} ms")]
    ReportingShorterThanSampling { sampling_ms: u64, reporting_ms: u64 },
    #[error("sample buffer needs {required} slots but only {available} are compiled in")]
    BufferTooSmall { required: usize, available: usize },
    #[error("full-tank echo ({full_us} us) must be below empty-tank echo ({empty_us} us)")]
    FuelCalibrationInverted { full_us: f32, empty_us: f32 },
    #[error("tank capacity must be positive, got {0}")]
    TankCapacity(f32),
    #[error("ultrasonic sample count must be non-zero")]
    ZeroPingSamples,
    #[error("device id {device_id} does not fit class field of {class_digits} digits")]
    DeviceIdClass { device_id: u32, class_digits: u8 },
    #[error("device id {device_id} is wider than {max_digits} digits")]
    DeviceIdWidth { device_id: u32, max_digits: usize },
    #[error("{field} limit {value} exceeds compiled maximum {max}")]
    LimitTooLarge { field: &'static str, value: usize, max: usize },
    #[error("{samples} ultrasonic samples exceed compiled maximum {max}")]
    TooManyPingSamples { samples: u8, max: usize },
    #[error("outbound limit {limit} cannot hold a {required}-byte report")]
    OutboundTooSmall { required: usize, limit: usize },
}

/// Logic level of a digital input that counts as "active".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveLevel {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub sampling_period_ms: u64,
    pub reporting_period_ms: u64,
    /// Extra buffer slots on top of reporting / sampling, absorbs scheduler jitter.
    pub buffer_margin: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sampling_period_ms: DEFAULT_SAMPLING_PERIOD_MS,
            reporting_period_ms: DEFAULT_REPORTING_PERIOD_MS,
            buffer_margin: DEFAULT_BUFFER_MARGIN,
        }
    }
}

impl TimingConfig {
    /// C = ceil(reporting / sampling) + margin
    pub fn buffer_capacity(&self) -> usize {
        let sampling = self.sampling_period_ms.max(1);
        let ticks = (self.reporting_period_ms + sampling - 1) / sampling;
        ticks as usize + self.buffer_margin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentSensorConfig {
    /// Half-wave crossings sampled per RMS measurement.
    pub rms_crossings: u32,
    pub rms_timeout_ms: u32,
}

impl Default for CurrentSensorConfig {
    fn default() -> Self {
        Self {
            rms_crossings: DEFAULT_RMS_CROSSINGS,
            rms_timeout_ms: DEFAULT_RMS_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RainSensorConfig {
    pub threshold_volts: f32,
    pub adc_reference_volts: f32,
    pub adc_bits: u8,
    pub active_level: ActiveLevel,
    pub tie_break: TieBreak,
}

impl Default for RainSensorConfig {
    fn default() -> Self {
        Self {
            threshold_volts: DEFAULT_RAIN_THRESHOLD_VOLTS,
            adc_reference_volts: DEFAULT_ADC_REFERENCE_VOLTS,
            adc_bits: DEFAULT_ADC_BITS,
            active_level: ActiveLevel::Low,
            tie_break: TieBreak::Dry,
        }
    }
}

impl RainSensorConfig {
    /// Threshold expressed in raw ADC counts (512 for 2.5 V on a 10-bit, 5 V converter).
    pub fn threshold_counts(&self) -> u16 {
        let full_scale = f32::from(1u16 << self.adc_bits.min(15));
        (self.threshold_volts * (full_scale / self.adc_reference_volts)) as u16
    }

    /// Digital line level for a raw ADC reading: high at or above the threshold.
    pub fn level_from_adc(&self, raw: u16) -> bool {
        raw >= self.threshold_counts()
    }

    pub fn is_wet(&self, level_high: bool) -> bool {
        match self.active_level {
            ActiveLevel::High => level_high,
            ActiveLevel::Low => !level_high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub device_id: u32,
    /// Low-order digits replaced by the "all" marker to form the class broadcast id.
    pub class_digits: u8,
    pub max_id_digits: usize,
    pub max_inbound_payload: usize,
    pub max_outbound_len: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            class_digits: DEFAULT_CLASS_DIGITS,
            max_id_digits: DEFAULT_MAX_ID_DIGITS,
            max_inbound_payload: DEFAULT_MAX_INBOUND_PAYLOAD,
            max_outbound_len: DEFAULT_MAX_OUTBOUND_LEN,
        }
    }
}

impl RadioConfig {
    /// 20009 with 4 class digits -> 29999
    pub fn broadcast_id(&self) -> u32 {
        let modulus = 10u32.saturating_pow(u32::from(self.class_digits));
        (self.device_id - self.device_id % modulus).saturating_add(modulus - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub timing: TimingConfig,
    pub current: CurrentSensorConfig,
    pub rain: RainSensorConfig,
    pub fuel: FuelCalibration,
    pub radio: RadioConfig,
}

impl NodeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timing = &self.timing;
        if timing.sampling_period_ms == 0 {
            return Err(ConfigError::ZeroPeriod("sampling"));
        }
        if timing.reporting_period_ms == 0 {
            return Err(ConfigError::ZeroPeriod("reporting"));
        }
        if timing.reporting_period_ms < timing.sampling_period_ms {
            return Err(ConfigError::ReportingShorterThanSampling {
                sampling_ms: timing.sampling_period_ms,
                reporting_ms: timing.reporting_period_ms,
            });
        }
        let required = timing.buffer_capacity();
        if required > MAX_SAMPLE_CAPACITY {
            return Err(ConfigError::BufferTooSmall {
                required,
                available: MAX_SAMPLE_CAPACITY,
            });
        }

        let fuel = &self.fuel;
        if fuel.full_echo_us >= fuel.empty_echo_us {
            return Err(ConfigError::FuelCalibrationInverted {
                full_us: fuel.full_echo_us,
                empty_us: fuel.empty_echo_us,
            });
        }
        if fuel.tank_capacity_l <= 0.0 {
            return Err(ConfigError::TankCapacity(fuel.tank_capacity_l));
        }
        if fuel.ping_samples == 0 {
            return Err(ConfigError::ZeroPingSamples);
        }
        if usize::from(fuel.ping_samples) > MAX_PING_SAMPLES {
            return Err(ConfigError::TooManyPingSamples {
                samples: fuel.ping_samples,
                max: MAX_PING_SAMPLES,
            });
        }

        let radio = &self.radio;
        let id_digits = digit_count(radio.device_id);
        if radio.class_digits == 0 || usize::from(radio.class_digits) >= id_digits {
            return Err(ConfigError::DeviceIdClass {
                device_id: radio.device_id,
                class_digits: radio.class_digits,
            });
        }
        if id_digits > radio.max_id_digits {
            return Err(ConfigError::DeviceIdWidth {
                device_id: radio.device_id,
                max_digits: radio.max_id_digits,
            });
        }
        if radio.max_inbound_payload > MAX_INBOUND_PAYLOAD_SIZE {
            return Err(ConfigError::LimitTooLarge {
                field: "inbound payload",
                value: radio.max_inbound_payload,
                max: MAX_INBOUND_PAYLOAD_SIZE,
            });
        }
        if radio.max_outbound_len > MAX_OUTBOUND_SIZE {
            return Err(ConfigError::LimitTooLarge {
                field: "outbound report",
                value: radio.max_outbound_len,
                max: MAX_OUTBOUND_SIZE,
            });
        }
        let required = min_report_len(radio.device_id, fuel.tank_capacity_l);
        if required > radio.max_outbound_len {
            return Err(ConfigError::OutboundTooSmall {
                required,
                limit: radio.max_outbound_len,
            });
        }

        Ok(())
    }
}

pub(crate) fn digit_count(mut value: u32) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.buffer_capacity(), 13);
        assert_eq!(config.radio.broadcast_id(), 29999);
    }

    #[test]
    fn test_rain_threshold_counts() {
        let rain = RainSensorConfig::default();
        assert_eq!(rain.threshold_counts(), 512);
        assert!(rain.level_from_adc(512));
        assert!(!rain.level_from_adc(511));
        // Active low: a low line means water on the sensor
        assert!(rain.is_wet(false));
        assert!(!rain.is_wet(true));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config = NodeConfig::from_json_str(r#"{"radio":{"device_id":31234}}"#).unwrap();
        assert_eq!(config.radio.device_id, 31234);
        assert_eq!(config.radio.broadcast_id(), 39999);
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn test_validation_rejections() {
        let mut config = NodeConfig::default();
        config.timing.reporting_period_ms = 1_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ReportingShorterThanSampling { .. })
        ));

        let mut config = NodeConfig::default();
        config.timing.sampling_period_ms = 100;
        assert!(matches!(config.validate(), Err(ConfigError::BufferTooSmall { .. })));

        let mut config = NodeConfig::default();
        config.fuel.full_echo_us = 1300.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FuelCalibrationInverted { .. })
        ));

        let mut config = NodeConfig::default();
        config.radio.device_id = 9;
        assert!(matches!(config.validate(), Err(ConfigError::DeviceIdClass { .. })));

        assert!(matches!(
            NodeConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_outbound_limit_must_fit_a_report() {
        let mut config = NodeConfig::default();
        config.radio.max_outbound_len = 23;
        assert_eq!(
            config.validate(),
            Err(ConfigError::OutboundTooSmall { required: 24, limit: 23 })
        );

        config.radio.max_outbound_len = 24;
        assert!(config.validate().is_ok());

        // A bigger tank prints wider
        config.fuel.tank_capacity_l = 120.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutboundTooSmall { required: 25, .. })
        ));
    }

    #[test]
    fn test_ping_samples_bounded() {
        let mut config = NodeConfig::default();
        config.fuel.ping_samples = 17;
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyPingSamples { samples: 17, max: 16 })
        );
    }

    #[test]
    fn test_digit_count() {
        assert_eq!(digit_count(0), 1);
        assert_eq!(digit_count(9), 1);
        assert_eq!(digit_count(20009), 5);
        assert_eq!(digit_count(999_999), 6);
    }
}
