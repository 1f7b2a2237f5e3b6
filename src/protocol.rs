use crate::config::RadioConfig;
use crate::gps::PositionFix;
use crate::sampling::RainVote;
use arrayvec::ArrayString;
use core::fmt::Write;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceiling of one LoRa packet; the configured limits must stay below it.
pub const MAX_OUTBOUND_SIZE: usize = 255;
pub const MAX_INBOUND_PAYLOAD_SIZE: usize = 128;
/// Widest destination id a u32 can hold.
pub const MAX_ID_DIGITS: usize = 9;
pub const MAX_INBOUND_SIZE: usize = MAX_ID_DIGITS + 1 + MAX_INBOUND_PAYLOAD_SIZE;

pub const INBOUND_DELIMITER: u8 = b'>';
pub const OUTBOUND_DELIMITER: char = ',';

pub type OutboundFrame = ArrayString<MAX_OUTBOUND_SIZE>;

/// Outbound report fields; the discriminant is the wire position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    DeviceId,
    Current,
    Rain,
    Fuel,
    Latitude,
    Longitude,
    Altitude,
}

impl Field {
    pub const fn precision(self) -> usize {
        match self {
            Field::DeviceId | Field::Rain => 0,
            Field::Current | Field::Fuel => 2,
            Field::Latitude | Field::Longitude => 5,
            Field::Altitude => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Field::DeviceId => "device_id",
            Field::Current => "current",
            Field::Rain => "rain",
            Field::Fuel => "fuel",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::Altitude => "altitude",
        }
    }
}

pub const REPORT_FIELD_COUNT: usize = 7;

pub const REPORT_FIELDS: [Field; REPORT_FIELD_COUNT] = [
    Field::DeviceId,
    Field::Current,
    Field::Rain,
    Field::Fuel,
    Field::Latitude,
    Field::Longitude,
    Field::Altitude,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("inbound frame has no '>' delimiter")]
    MissingDelimiter,
    #[error("destination id is not a number of 1 to {max_digits} digits")]
    InvalidDestination { max_digits: usize },
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("field '{0}' could not be parsed")]
    InvalidField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

impl Position {
    /// `None` until the tracker has produced its first fix.
    pub fn from_fix(fix: &PositionFix) -> Option<Self> {
        fix.valid.then_some(Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude_m: fix.altitude_m,
        })
    }
}

/// Values carried by one outbound report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub device_id: u32,
    pub mean_current: f32,
    pub rain: RainVote,
    pub fuel_l: f32,
    /// `None` is sent as empty position fields.
    pub position: Option<Position>,
}

/// Render `report` in wire order. If the frame would exceed `max_len` the
/// position fields are left empty; if it still does not fit, that is an error.
pub fn encode_report(report: &Report, max_len: usize) -> Result<OutboundFrame, ProtocolError> {
    let max = max_len.min(MAX_OUTBOUND_SIZE);

    if report.position.is_some() {
        if let Ok(frame) = write_report(report, true) {
            if frame.len() <= max {
                return Ok(frame);
            }
        }
    }

    let frame = write_report(report, false)?;
    if frame.len() > max {
        return Err(ProtocolError::FrameTooLarge { len: frame.len(), max });
    }
    Ok(frame)
}

fn write_report(report: &Report, with_position: bool) -> Result<OutboundFrame, ProtocolError> {
    let mut frame = OutboundFrame::new();
    let position = report.position.filter(|_| with_position);

    for (i, field) in REPORT_FIELDS.iter().enumerate() {
        if i > 0 {
            frame
                .try_push(OUTBOUND_DELIMITER)
                .map_err(|_| too_large(&frame))?;
        }

        let precision = field.precision();
        let written = match field {
            Field::DeviceId => write!(frame, "{}", report.device_id),
            Field::Current => write!(frame, "{:.*}", precision, report.mean_current),
            Field::Rain => write!(frame, "{}", report.rain.as_wire()),
            Field::Fuel => write!(frame, "{:.*}", precision, report.fuel_l),
            Field::Latitude => match position {
                Some(p) => write!(frame, "{:.*}", precision, p.latitude),
                None => Ok(()),
            },
            Field::Longitude => match position {
                Some(p) => write!(frame, "{:.*}", precision, p.longitude),
                None => Ok(()),
            },
            Field::Altitude => match position {
                Some(p) => write!(frame, "{:.*}", precision, p.altitude_m),
                None => Ok(()),
            },
        };
        written.map_err(|_| too_large(&frame))?;
    }

    Ok(frame)
}

fn too_large(frame: &OutboundFrame) -> ProtocolError {
    ProtocolError::FrameTooLarge {
        len: frame.len() + 1,
        max: MAX_OUTBOUND_SIZE,
    }
}

/// Largest mean current the outbound limit is sized for.
pub const WORST_CASE_CURRENT_A: f32 = 9_999.99;

/// Length of the longest position-less report `device_id` can produce, with
/// the current at [`WORST_CASE_CURRENT_A`] and the fuel at a full tank.
pub fn min_report_len(device_id: u32, tank_capacity_l: f32) -> usize {
    let worst = Report {
        device_id,
        mean_current: WORST_CASE_CURRENT_A,
        rain: RainVote::Wet,
        fuel_l: tank_capacity_l,
        position: None,
    };
    match write_report(&worst, false) {
        Ok(frame) => frame.len(),
        Err(_) => MAX_OUTBOUND_SIZE + 1,
    }
}

/// Inverse of [`encode_report`], up to the per-field precision.
pub fn decode_report(frame: &str) -> Result<Report, ProtocolError> {
    let frame = frame.trim_end_matches(|c| c == '\r' || c == '\n');
    let mut values: heapless::Vec<&str, REPORT_FIELD_COUNT> = heapless::Vec::new();
    let mut found = 0;
    for value in frame.split(OUTBOUND_DELIMITER) {
        found += 1;
        let _ = values.push(value);
    }
    if found != REPORT_FIELDS.len() {
        return Err(ProtocolError::FieldCount {
            expected: REPORT_FIELDS.len(),
            found,
        });
    }
    let value = |field: Field| values[field as usize];

    let device_id: u32 = parse_field(value(Field::DeviceId), Field::DeviceId)?;
    let mean_current: f32 = parse_field(value(Field::Current), Field::Current)?;
    let rain = parse_field::<u8>(value(Field::Rain), Field::Rain)
        .ok()
        .and_then(RainVote::from_wire)
        .ok_or(ProtocolError::InvalidField(Field::Rain.name()))?;
    let fuel_l: f32 = parse_field(value(Field::Fuel), Field::Fuel)?;

    let position_fields = [Field::Latitude, Field::Longitude, Field::Altitude];
    let position = if position_fields.iter().all(|f| value(*f).is_empty()) {
        None
    } else {
        Some(Position {
            latitude: parse_field(value(Field::Latitude), Field::Latitude)?,
            longitude: parse_field(value(Field::Longitude), Field::Longitude)?,
            altitude_m: parse_field(value(Field::Altitude), Field::Altitude)?,
        })
    };

    Ok(Report {
        device_id,
        mean_current,
        rain,
        fuel_l,
        position,
    })
}

fn parse_field<T: core::str::FromStr>(raw: &str, field: Field) -> Result<T, ProtocolError> {
    raw.parse().map_err(|_| ProtocolError::InvalidField(field.name()))
}

/// Own id plus the class-wide broadcast id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressing {
    pub own_id: u32,
    pub broadcast_id: u32,
}

impl Addressing {
    pub fn from_config(radio: &RadioConfig) -> Self {
        Self {
            own_id: radio.device_id,
            broadcast_id: radio.broadcast_id(),
        }
    }

    pub fn accepts(&self, destination_id: u32) -> bool {
        destination_id == self.own_id || destination_id == self.broadcast_id
    }
}

/// A frame addressed to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundFrame<'a> {
    pub destination_id: u32,
    pub payload: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    Accepted(InboundFrame<'a>),
    /// Addressed to another node; the payload was not looked at.
    Foreign { destination_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundLimits {
    pub max_id_digits: usize,
    pub max_payload: usize,
}

impl InboundLimits {
    pub fn from_config(radio: &RadioConfig) -> Self {
        Self {
            max_id_digits: radio.max_id_digits.min(MAX_ID_DIGITS),
            max_payload: radio.max_inbound_payload.min(MAX_INBOUND_PAYLOAD_SIZE),
        }
    }
}

/// Split `<dest_id>'>'<payload>` and check the destination before touching the payload.
pub fn parse_inbound<'a>(
    raw: &'a [u8],
    addressing: &Addressing,
    limits: &InboundLimits,
) -> Result<Inbound<'a>, ProtocolError> {
    let split = raw
        .iter()
        .position(|&b| b == INBOUND_DELIMITER)
        .ok_or(ProtocolError::MissingDelimiter)?;
    let (id_bytes, rest) = raw.split_at(split);

    let invalid = ProtocolError::InvalidDestination { max_digits: limits.max_id_digits };
    if id_bytes.is_empty()
        || id_bytes.len() > limits.max_id_digits
        || !id_bytes.iter().all(u8::is_ascii_digit)
    {
        return Err(invalid);
    }
    let destination_id = id_bytes
        .iter()
        .try_fold(0u32, |acc, &b| acc.checked_mul(10)?.checked_add(u32::from(b - b'0')))
        .ok_or(invalid)?;

    if !addressing.accepts(destination_id) {
        return Ok(Inbound::Foreign { destination_id });
    }

    let payload = &rest[1..];
    if payload.len() > limits.max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload.len(),
            max: limits.max_payload,
        });
    }
    let payload = core::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;

    Ok(Inbound::Accepted(InboundFrame {
        destination_id,
        payload,
    }))
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub reports_composed: u32,
    pub position_dropped: u32,
    pub frames_parsed: u32,
    pub accepted: u32,
    pub foreign: u32,
    pub malformed: u32,
}

/// Codec bound to one node: its addressing and its limits.
#[derive(Debug)]
pub struct ProtocolHandler {
    addressing: Addressing,
    limits: InboundLimits,
    max_outbound_len: usize,
    stats: ProtocolStats,
}

impl ProtocolHandler {
    pub fn new(radio: &RadioConfig) -> Self {
        Self {
            addressing: Addressing::from_config(radio),
            limits: InboundLimits::from_config(radio),
            max_outbound_len: radio.max_outbound_len.min(MAX_OUTBOUND_SIZE),
            stats: ProtocolStats::default(),
        }
    }

    /// Cap the outbound size further, e.g. to what the transport reports.
    pub fn limit_outbound(&mut self, max_len: usize) {
        self.max_outbound_len = self.max_outbound_len.min(max_len);
    }

    pub fn compose(&mut self, report: &Report) -> Result<OutboundFrame, ProtocolError> {
        let frame = encode_report(report, self.max_outbound_len)?;
        self.stats.reports_composed = self.stats.reports_composed.wrapping_add(1);
        if report.position.is_some() && frame.ends_with(",,,") {
            self.stats.position_dropped = self.stats.position_dropped.wrapping_add(1);
        }
        Ok(frame)
    }

    pub fn parse<'a>(&mut self, raw: &'a [u8]) -> Result<Inbound<'a>, ProtocolError> {
        self.stats.frames_parsed = self.stats.frames_parsed.wrapping_add(1);
        let result = parse_inbound(raw, &self.addressing, &self.limits);
        match &result {
            Ok(Inbound::Accepted(_)) => self.stats.accepted = self.stats.accepted.wrapping_add(1),
            Ok(Inbound::Foreign { .. }) => self.stats.foreign = self.stats.foreign.wrapping_add(1),
            Err(_) => self.stats.malformed = self.stats.malformed.wrapping_add(1),
        }
        result
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    pub fn max_outbound_len(&self) -> usize {
        self.max_outbound_len
    }

    pub fn get_stats(&self) -> &ProtocolStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> Report {
        Report {
            device_id: 20009,
            mean_current: 1.23,
            rain: RainVote::Wet,
            fuel_l: 5.5,
            position: Some(Position {
                latitude: -34.57475,
                longitude: -58.43552,
                altitude_m: 15.0,
            }),
        }
    }

    #[test]
    fn test_field_order_and_precision() {
        let frame = encode_report(&sample_report(), 200).unwrap();
        assert_eq!(frame.as_str(), "20009,1.23,1,5.50,-34.57475,-58.43552,15.0");
    }

    #[test]
    fn test_position_dropped_when_too_long() {
        let frame = encode_report(&sample_report(), 30).unwrap();
        assert_eq!(frame.as_str(), "20009,1.23,1,5.50,,,");

        let decoded = decode_report(&frame).unwrap();
        assert!(decoded.position.is_none());
    }

    #[test]
    fn test_report_too_long_even_without_position() {
        let result = encode_report(&sample_report(), 10);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_min_report_len_covers_worst_case() {
        let required = min_report_len(20009, 12.0);
        assert_eq!(required, "20009,9999.99,1,12.00,,,".len());

        let report = Report {
            mean_current: WORST_CASE_CURRENT_A,
            fuel_l: 12.0,
            ..sample_report()
        };
        assert!(encode_report(&report, required).is_ok());
        assert!(encode_report(&report, required - 1).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!(
            decode_report("20009,1.23,1"),
            Err(ProtocolError::FieldCount { expected: 7, found: 3 })
        ));
        assert_eq!(
            decode_report("20009,abc,1,5.50,,,"),
            Err(ProtocolError::InvalidField("current"))
        );
        assert_eq!(
            decode_report("20009,1.23,7,5.50,,,"),
            Err(ProtocolError::InvalidField("rain"))
        );
        assert_eq!(
            decode_report("20009,1.23,1,5.50,-34.5,,"),
            Err(ProtocolError::InvalidField("longitude"))
        );
    }

    #[test]
    fn test_inbound_destination_validation() {
        let addressing = Addressing { own_id: 20009, broadcast_id: 29999 };
        let limits = InboundLimits { max_id_digits: 6, max_payload: 100 };

        assert_eq!(
            parse_inbound(b">startAlert", &addressing, &limits),
            Err(ProtocolError::InvalidDestination { max_digits: 6 })
        );
        assert_eq!(
            parse_inbound(b"2000900>startAlert", &addressing, &limits),
            Err(ProtocolError::InvalidDestination { max_digits: 6 })
        );
        assert_eq!(
            parse_inbound(b"20a09>startAlert", &addressing, &limits),
            Err(ProtocolError::InvalidDestination { max_digits: 6 })
        );
    }

    #[test]
    fn test_foreign_payload_is_never_inspected() {
        let addressing = Addressing { own_id: 20009, broadcast_id: 29999 };
        let limits = InboundLimits { max_id_digits: 6, max_payload: 4 };

        // Oversized, non-UTF-8 payload is fine when the frame is not for us
        let raw = b"30001>\xff\xfe\xfd\xfc\xfb\xfa";
        assert_eq!(
            parse_inbound(raw, &addressing, &limits),
            Ok(Inbound::Foreign { destination_id: 30001 })
        );
    }

    #[test]
    fn test_handler_counts_outcomes() {
        let mut handler = ProtocolHandler::new(&RadioConfig::default());
        assert!(handler.parse(b"20009>startAlert").is_ok());
        assert!(handler.parse(b"12345>startAlert").is_ok());
        assert!(handler.parse(b"startAlert").is_err());

        let stats = handler.get_stats();
        assert_eq!(stats.frames_parsed, 3);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.foreign, 1);
        assert_eq!(stats.malformed, 1);
    }
}
