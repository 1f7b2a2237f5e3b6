//! Deterministic stand-ins for the node peripherals, used by the tests and
//! by the desktop simulator.

use crate::gps::gga_sentence;
use crate::hal::{Buzzer, RadioTransport, SensorDriver, Watchdog};
use std::collections::VecDeque;
use thiserror::Error;

/// Sensors that replay queued values. Once a queue runs dry the last value repeats.
#[derive(Debug, Clone)]
pub struct ScriptedSensors {
    currents: VecDeque<f32>,
    rain_levels: VecDeque<bool>,
    echoes: VecDeque<f32>,
    gps_bytes: VecDeque<u8>,
    last_current: f32,
    last_rain_level: bool,
    last_echo: f32,
    pub current_reads: u32,
    pub rain_reads: u32,
    pub fuel_pings: u32,
}

impl ScriptedSensors {
    pub fn new() -> Self {
        Self {
            currents: VecDeque::new(),
            rain_levels: VecDeque::new(),
            echoes: VecDeque::new(),
            gps_bytes: VecDeque::new(),
            last_current: 0.0,
            // Line idles high: dry for an active-low sensor
            last_rain_level: true,
            last_echo: 0.0,
            current_reads: 0,
            rain_reads: 0,
            fuel_pings: 0,
        }
    }

    pub fn push_currents(&mut self, values: &[f32]) -> &mut Self {
        self.currents.extend(values.iter().copied());
        self
    }

    pub fn push_rain_levels(&mut self, levels: &[bool]) -> &mut Self {
        self.rain_levels.extend(levels.iter().copied());
        self
    }

    pub fn push_echoes(&mut self, echoes_us: &[f32]) -> &mut Self {
        self.echoes.extend(echoes_us.iter().copied());
        self
    }

    pub fn push_gps_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.gps_bytes.extend(bytes.iter().copied());
        self
    }

    pub fn push_gps_fix(&mut self, latitude: f64, longitude: f64, altitude_m: f64) -> &mut Self {
        let sentence = gga_sentence(latitude, longitude, altitude_m);
        self.push_gps_bytes(sentence.as_bytes())
    }

    pub fn pending_gps_bytes(&self) -> usize {
        self.gps_bytes.len()
    }
}

impl Default for ScriptedSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for ScriptedSensors {
    fn read_current(&mut self, _crossings: u32, _timeout_ms: u32) -> f32 {
        self.current_reads += 1;
        if let Some(value) = self.currents.pop_front() {
            self.last_current = value;
        }
        self.last_current
    }

    fn read_rain_digital(&mut self) -> bool {
        self.rain_reads += 1;
        if let Some(level) = self.rain_levels.pop_front() {
            self.last_rain_level = level;
        }
        self.last_rain_level
    }

    fn ping_fuel_echo(&mut self) -> f32 {
        self.fuel_pings += 1;
        if let Some(echo) = self.echoes.pop_front() {
            self.last_echo = echo;
        }
        self.last_echo
    }

    fn read_gps_bytes(&mut self, buf: &mut [u8]) -> usize {
        let count = buf.len().min(self.gps_bytes.len());
        for (slot, byte) in buf.iter_mut().zip(self.gps_bytes.drain(..count)) {
            *slot = byte;
        }
        count
    }
}

/// Simulated field conditions: noisy leakage current, intermittent rain,
/// a slowly draining tank with the odd missed or doubled echo, and a
/// receiver repeating a fixed position.
#[derive(Debug, Clone)]
pub struct MockSensors {
    rng: u32,
    base_current: f32,
    rain_chance_percent: u32,
    echo_us: f32,
    drain_us_per_ping: f32,
    position: (f64, f64, f64),
    gps_backlog: VecDeque<u8>,
}

impl MockSensors {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: seed.max(1),
            base_current: 0.26,
            rain_chance_percent: 30,
            echo_us: 560.0,
            drain_us_per_ping: 2.5,
            position: (-34.57475, -58.43552, 15.0),
            gps_backlog: VecDeque::new(),
        }
    }

    pub fn with_rain_chance(mut self, percent: u32) -> Self {
        self.rain_chance_percent = percent.min(100);
        self
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64, altitude_m: f64) -> Self {
        self.position = (latitude, longitude, altitude_m);
        self
    }

    // xorshift32
    fn random(&mut self, bound: u32) -> u32 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        x % bound.max(1)
    }
}

impl SensorDriver for MockSensors {
    fn read_current(&mut self, _crossings: u32, _timeout_ms: u32) -> f32 {
        self.base_current + self.random(30) as f32 / 100.0
    }

    fn read_rain_digital(&mut self) -> bool {
        // Active-low sensor: low while wet
        self.random(100) >= self.rain_chance_percent
    }

    fn ping_fuel_echo(&mut self) -> f32 {
        self.echo_us += self.drain_us_per_ping;
        match self.random(100) {
            // Missed echo
            0..=2 => 0.0,
            // Reflection off the tank wall
            3..=4 => self.echo_us * 2.0,
            _ => self.echo_us + self.random(9) as f32 - 4.0,
        }
    }

    fn read_gps_bytes(&mut self, buf: &mut [u8]) -> usize {
        if self.gps_backlog.is_empty() {
            let (lat, lng, alt) = self.position;
            self.gps_backlog.extend(gga_sentence(lat, lng, alt).as_bytes());
        }
        let count = buf.len().min(self.gps_backlog.len());
        for (slot, byte) in buf.iter_mut().zip(self.gps_backlog.drain(..count)) {
            *slot = byte;
        }
        count
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SimRadioError {
    #[error("packet of {len} bytes exceeds transport limit {max}")]
    TooLarge { len: usize, max: usize },
    #[error("transmitter fault injected")]
    Fault,
}

/// Radio that records what was sent and hands back queued inbound packets.
#[derive(Debug, Clone)]
pub struct LoopbackRadio {
    pub sent: Vec<Vec<u8>>,
    inbox: VecDeque<Vec<u8>>,
    max_payload: usize,
    pub receive_mode_entries: u32,
    fail_next_send: bool,
}

impl LoopbackRadio {
    pub fn new(max_payload: usize) -> Self {
        Self {
            sent: Vec::new(),
            inbox: VecDeque::new(),
            max_payload,
            receive_mode_entries: 0,
            fail_next_send: false,
        }
    }

    pub fn inject(&mut self, packet: &[u8]) {
        self.inbox.push_back(packet.to_vec());
    }

    pub fn fail_next_send(&mut self) {
        self.fail_next_send = true;
    }

    pub fn sent_frames(&self) -> impl Iterator<Item = &str> {
        self.sent.iter().filter_map(|frame| core::str::from_utf8(frame).ok())
    }

    pub fn last_sent(&self) -> Option<&str> {
        self.sent.last().and_then(|frame| core::str::from_utf8(frame).ok())
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbox.len()
    }
}

impl RadioTransport for LoopbackRadio {
    type Error = SimRadioError;

    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        if core::mem::take(&mut self.fail_next_send) {
            return Err(SimRadioError::Fault);
        }
        if frame.len() > self.max_payload {
            return Err(SimRadioError::TooLarge {
                len: frame.len(),
                max: self.max_payload,
            });
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error> {
        let packet = self.inbox.pop_front().ok_or(nb::Error::WouldBlock)?;
        // Longer packets are cut at the buffer, as a radio FIFO would
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        Ok(len)
    }

    fn enter_receive_mode(&mut self) -> Result<(), Self::Error> {
        self.receive_mode_entries += 1;
        Ok(())
    }

    fn max_payload(&self) -> usize {
        self.max_payload
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingBuzzer {
    pub on: bool,
    pub switch_ons: u32,
}

impl Buzzer for RecordingBuzzer {
    fn set(&mut self, on: bool) {
        if on && !self.on {
            self.switch_ons += 1;
        }
        self.on = on;
    }
}

#[derive(Debug, Clone, Default)]
pub struct CountingWatchdog {
    pub feeds: u64,
}

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_values_repeat_last() {
        let mut sensors = ScriptedSensors::new();
        sensors.push_currents(&[0.2, 0.3]);
        assert_eq!(sensors.read_current(20, 1000), 0.2);
        assert_eq!(sensors.read_current(20, 1000), 0.3);
        assert_eq!(sensors.read_current(20, 1000), 0.3);
        assert_eq!(sensors.current_reads, 3);
    }

    #[test]
    fn test_gps_bytes_drain_in_chunks() {
        let mut sensors = ScriptedSensors::new();
        sensors.push_gps_bytes(b"$GPGGA,1*00\r\n");
        let mut buf = [0u8; 4];
        assert_eq!(sensors.read_gps_bytes(&mut buf), 4);
        assert_eq!(&buf, b"$GPG");
        assert_eq!(sensors.pending_gps_bytes(), 9);
    }

    #[test]
    fn test_loopback_radio() {
        let mut radio = LoopbackRadio::new(8);
        let mut buf = [0u8; 16];
        assert!(matches!(radio.receive(&mut buf), Err(nb::Error::WouldBlock)));

        radio.inject(b"1>x");
        assert_eq!(radio.receive(&mut buf), Ok(3));
        assert_eq!(&buf[..3], b"1>x");

        assert!(radio.send(b"short").is_ok());
        assert_eq!(
            radio.send(b"much too long"),
            Err(SimRadioError::TooLarge { len: 13, max: 8 })
        );
        radio.fail_next_send();
        assert_eq!(radio.send(b"ok"), Err(SimRadioError::Fault));
        assert_eq!(radio.last_sent(), Some("short"));
    }

    #[test]
    fn test_scripted_echoes_reduce_to_median() {
        let mut sensors = ScriptedSensors::new();
        sensors.push_echoes(&[845.0, 850.0, 4000.0, 0.0, 840.0]);
        assert_eq!(sensors.read_fuel_echo_median(5), Some(850.0));
        assert_eq!(sensors.fuel_pings, 5);

        let mut silent = ScriptedSensors::new();
        assert_eq!(silent.read_fuel_echo_median(5), None);
    }

    #[test]
    fn test_mock_echo_tracks_draining_tank() {
        let mut sensors = MockSensors::new(3);
        let mut echoes = Vec::new();
        for _ in 0..20 {
            let echo = sensors.read_fuel_echo_median(5).expect("most pings echo");
            assert!(echo > 0.0);
            echoes.push(echo);
        }
        // The tank drains: late measurements read longer echoes than early ones
        assert!(echoes[19] > echoes[0]);
    }

    #[test]
    fn test_mock_sensors_stay_in_range() {
        let mut sensors = MockSensors::new(7);
        for _ in 0..100 {
            let current = sensors.read_current(20, 1000);
            assert!((0.26..0.56).contains(&current));
        }
    }
}
