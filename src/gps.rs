use core::fmt::Write;
use serde::{Deserialize, Serialize};
use tracing::trace;

const SENTENCE_BUFFER_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    /// Set by the first complete fix and never cleared; the fix may be stale.
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrackerStats {
    pub sentences: u32,
    pub fixes: u32,
    pub checksum_errors: u32,
    pub overflows: u32,
    pub ignored: u32,
}

/// Incremental NMEA decoder that keeps the latest GGA fix.
#[derive(Debug)]
pub struct PositionTracker {
    buffer: heapless::String<SENTENCE_BUFFER_SIZE>,
    fix: PositionFix,
    stats: TrackerStats,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            buffer: heapless::String::new(),
            fix: PositionFix::default(),
            stats: TrackerStats::default(),
        }
    }

    /// Feed raw bytes from the receiver; partial sentences carry over to the next call.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'$' {
                self.buffer.clear();
            }

            if self.buffer.push(char::from(byte)).is_err() {
                self.stats.overflows = self.stats.overflows.wrapping_add(1);
                self.buffer.clear();
                continue;
            }

            if byte == b'\n' {
                self.finish_sentence();
                self.buffer.clear();
            }
        }
    }

    pub fn read(&self) -> PositionFix {
        self.fix
    }

    pub fn get_stats(&self) -> &TrackerStats {
        &self.stats
    }

    fn finish_sentence(&mut self) {
        let mut local: heapless::String<SENTENCE_BUFFER_SIZE> = heapless::String::new();
        let _ = local.push_str(self.buffer.trim());
        let sentence = local.as_str();

        if !sentence.starts_with('$') || sentence.len() < 7 {
            self.stats.ignored = self.stats.ignored.wrapping_add(1);
            return;
        }
        if !verify_checksum(sentence) {
            self.stats.checksum_errors = self.stats.checksum_errors.wrapping_add(1);
            return;
        }
        self.stats.sentences = self.stats.sentences.wrapping_add(1);

        if sentence.get(3..6) == Some("GGA") {
            if let Some(fix) = parse_gga(sentence) {
                trace!(lat = fix.latitude, lng = fix.longitude, alt = fix.altitude_m, "gps fix");
                self.fix = fix;
                self.stats.fixes = self.stats.fixes.wrapping_add(1);
            }
        } else {
            self.stats.ignored = self.stats.ignored.wrapping_add(1);
        }
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

// $xxGGA,time,lat,NS,lon,EW,quality,sats,hdop,alt,M,...*CS
fn parse_gga(sentence: &str) -> Option<PositionFix> {
    let body = sentence.split('*').next()?;
    let mut fields = body.split(',').skip(2);

    let lat_raw = fields.next()?;
    let ns = fields.next()?;
    let lon_raw = fields.next()?;
    let ew = fields.next()?;
    let quality: u8 = fields.next()?.parse().ok()?;
    let _sats = fields.next();
    let _hdop = fields.next();
    let altitude_m: f64 = fields.next()?.parse().ok()?;

    if quality == 0 {
        return None;
    }

    let mut latitude = degrees_from_nmea(lat_raw)?;
    if ns == "S" {
        latitude = -latitude;
    }
    let mut longitude = degrees_from_nmea(lon_raw)?;
    if ew == "W" {
        longitude = -longitude;
    }

    Some(PositionFix {
        latitude,
        longitude,
        altitude_m,
        valid: true,
    })
}

// ddmm.mmmm / dddmm.mmmm -> decimal degrees
fn degrees_from_nmea(raw: &str) -> Option<f64> {
    let value: f64 = raw.parse().ok()?;
    let degrees = (value / 100.0).floor();
    let minutes = value - degrees * 100.0;
    Some(degrees + minutes / 60.0)
}

/// XOR of every byte between `$` and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

fn verify_checksum(sentence: &str) -> bool {
    let Some((content, check)) = sentence.split_once('*') else {
        return false;
    };
    let content = content.strip_prefix('$').unwrap_or(content);
    let hex = check.get(..2).unwrap_or(check);
    match u8::from_str_radix(hex.trim(), 16) {
        Ok(expected) => checksum(content) == expected,
        Err(_) => false,
    }
}

/// Build a checksummed GGA sentence (with trailing CRLF) for a fix.
pub fn gga_sentence(latitude: f64, longitude: f64, altitude_m: f64) -> heapless::String<SENTENCE_BUFFER_SIZE> {
    let mut body: heapless::String<SENTENCE_BUFFER_SIZE> = heapless::String::new();
    let (lat_deg, lat_min) = split_degrees(latitude.abs());
    let (lon_deg, lon_min) = split_degrees(longitude.abs());
    let _ = write!(
        body,
        "GPGGA,120000.00,{:02}{:07.4},{},{:03}{:07.4},{},1,08,0.9,{:.1},M,0.0,M,,",
        lat_deg,
        lat_min,
        if latitude < 0.0 { 'S' } else { 'N' },
        lon_deg,
        lon_min,
        if longitude < 0.0 { 'W' } else { 'E' },
        altitude_m,
    );

    let mut sentence: heapless::String<SENTENCE_BUFFER_SIZE> = heapless::String::new();
    let _ = write!(sentence, "${}*{:02X}\r\n", body, checksum(&body));
    sentence
}

fn split_degrees(value: f64) -> (u32, f64) {
    let degrees = value.floor();
    (degrees as u32, (value - degrees) * 60.0)
}
