use crate::config::{CurrentSensorConfig, RainSensorConfig};
use crate::hal::SensorDriver;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Compiled upper bound for the rolling buffers; the configured capacity must not exceed it.
pub const MAX_SAMPLE_CAPACITY: usize = 32;

pub const CURRENT_SENTINEL: f32 = 0.0;

/// One rain poll. `Unknown` marks slots not written this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum RainReading {
    Unknown = -1,
    Dry = 0,
    Wet = 1,
}

/// Outcome of the per-cycle majority vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RainVote {
    Dry,
    Wet,
}

impl RainVote {
    pub fn as_wire(self) -> u8 {
        match self {
            RainVote::Dry => 0,
            RainVote::Wet => 1,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(RainVote::Dry),
            1 => Some(RainVote::Wet),
            _ => None,
        }
    }
}

/// Which state wins when wet and dry polls are even (including no polls at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TieBreak {
    #[default]
    Dry,
    Wet,
}

impl From<TieBreak> for RainVote {
    fn from(tie_break: TieBreak) -> Self {
        match tie_break {
            TieBreak::Dry => RainVote::Dry,
            TieBreak::Wet => RainVote::Wet,
        }
    }
}

/// Pending reads for the fast-tick sensors. Set by the sample tick,
/// each flag cleared as soon as its sensor has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefreshRequests {
    pub current: bool,
    pub rain: bool,
}

impl RefreshRequests {
    pub fn any(&self) -> bool {
        self.current || self.rain
    }
}

/// Pending reads for the report-rate sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportRequests {
    pub fuel: bool,
    pub gps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleAggregate {
    pub mean_current: f32,
    pub rain: RainVote,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored { index: usize },
    /// Buffers already hold `capacity` entries this cycle.
    Dropped,
}

/// Current and rain rolling buffers behind one shared write index, so the
/// i-th current and the i-th rain reading always come from the same tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingManager {
    currents: [f32; MAX_SAMPLE_CAPACITY],
    raindrops: [RainReading; MAX_SAMPLE_CAPACITY],
    index: usize,
    capacity: usize,
    requests: RefreshRequests,
    tie_break: TieBreak,
}

impl SamplingManager {
    pub fn new(capacity: usize, tie_break: TieBreak) -> Self {
        debug_assert!(
            capacity <= MAX_SAMPLE_CAPACITY,
            "Sample capacity {} exceeds compiled maximum {}",
            capacity, MAX_SAMPLE_CAPACITY
        );

        Self {
            currents: [CURRENT_SENTINEL; MAX_SAMPLE_CAPACITY],
            raindrops: [RainReading::Unknown; MAX_SAMPLE_CAPACITY],
            index: 0,
            capacity: capacity.min(MAX_SAMPLE_CAPACITY),
            requests: RefreshRequests::default(),
            tie_break,
        }
    }

    /// Fast tick: ask for one reading of every sensor.
    pub fn request_refresh(&mut self) {
        self.requests = RefreshRequests { current: true, rain: true };
    }

    pub fn requests(&self) -> RefreshRequests {
        self.requests
    }

    /// Read every sensor with a pending request and record the tick.
    /// Returns `None` when nothing was pending.
    pub fn service<S: SensorDriver + ?Sized>(
        &mut self,
        sensors: &mut S,
        current_cfg: &CurrentSensorConfig,
        rain_cfg: &RainSensorConfig,
    ) -> Option<RecordOutcome> {
        if !self.requests.any() {
            return None;
        }

        let mut current = CURRENT_SENTINEL;
        if self.requests.current {
            current = sensors.read_current(current_cfg.rms_crossings, current_cfg.rms_timeout_ms);
            self.requests.current = false;
        }

        let mut rain = RainReading::Unknown;
        if self.requests.rain {
            rain = if rain_cfg.is_wet(sensors.read_rain_digital()) {
                RainReading::Wet
            } else {
                RainReading::Dry
            };
            self.requests.rain = false;
        }

        trace!(current, ?rain, index = self.index, "sensor tick");
        Some(self.record(current, rain))
    }

    /// Append one time-aligned pair at the shared index. Past capacity the
    /// pair is dropped; this is a soft limit, not a fault.
    pub fn record(&mut self, current: f32, rain: RainReading) -> RecordOutcome {
        if self.index >= self.capacity {
            return RecordOutcome::Dropped;
        }

        let index = self.index;
        self.currents[index] = current;
        self.raindrops[index] = rain;
        self.index += 1;
        RecordOutcome::Stored { index }
    }

    /// Mean of the written current entries, 0.0 when none were written.
    pub fn mean_current(&self) -> f32 {
        let written = self.currents();
        if written.is_empty() {
            return CURRENT_SENTINEL;
        }
        written.iter().sum::<f32>() / written.len() as f32
    }

    /// Majority of known rain polls; even counts resolve through the tie-break.
    pub fn rain_vote(&self) -> RainVote {
        let (wet, dry) = self.rain_readings().iter().fold((0usize, 0usize), |(wet, dry), reading| {
            match reading {
                RainReading::Wet => (wet + 1, dry),
                RainReading::Dry => (wet, dry + 1),
                RainReading::Unknown => (wet, dry),
            }
        });

        if wet > dry {
            RainVote::Wet
        } else if dry > wet {
            RainVote::Dry
        } else {
            self.tie_break.into()
        }
    }

    /// Reduce both buffers, then return them to their start-of-cycle state.
    pub fn flush(&mut self) -> CycleAggregate {
        let aggregate = CycleAggregate {
            mean_current: self.mean_current(),
            rain: self.rain_vote(),
            samples: self.index,
        };
        self.reset();
        aggregate
    }

    pub fn reset(&mut self) {
        self.currents = [CURRENT_SENTINEL; MAX_SAMPLE_CAPACITY];
        self.raindrops = [RainReading::Unknown; MAX_SAMPLE_CAPACITY];
        self.index = 0;
        self.requests = RefreshRequests::default();
    }

    pub fn currents(&self) -> &[f32] {
        &self.currents[..self.index]
    }

    pub fn rain_readings(&self) -> &[RainReading] {
        &self.raindrops[..self.index]
    }

    pub fn len(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    pub fn is_full(&self) -> bool {
        self.index >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }
}
