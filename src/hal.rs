//! Interfaces to the peripherals the node core drives but does not own.
//!
//! Implementations must keep every call short: the whole main-loop pass has
//! to finish inside the watchdog window, and a slow driver delays every
//! other timing slot.

use crate::fuel::{median, MAX_PING_SAMPLES};

/// Field sensors sampled by the node.
pub trait SensorDriver {
    /// RMS leakage current in amperes, measured over `crossings` half-waves
    /// or until `timeout_ms` elapses.
    fn read_current(&mut self, crossings: u32, timeout_ms: u32) -> f32;

    /// Raw level of the rain line. Interpreted through the configured active level.
    fn read_rain_digital(&mut self) -> bool;

    /// One ultrasonic ping: echo duration in microseconds, 0 when no echo came back.
    fn ping_fuel_echo(&mut self) -> f32;

    /// Median of `samples` pings, ignoring missed ones. `None` when every ping
    /// missed. Drivers that filter in hardware may override this.
    fn read_fuel_echo_median(&mut self, samples: u8) -> Option<f32> {
        let mut pings: heapless::Vec<f32, MAX_PING_SAMPLES> = heapless::Vec::new();
        for _ in 0..usize::from(samples).min(MAX_PING_SAMPLES) {
            let _ = pings.push(self.ping_fuel_echo());
        }
        median(&pings)
    }

    /// Copy whatever bytes the GPS receiver has buffered into `buf`; returns the count.
    fn read_gps_bytes(&mut self, buf: &mut [u8]) -> usize;
}

/// Long-range half-duplex radio. Sends are fire-and-forget.
pub trait RadioTransport {
    type Error: core::fmt::Debug;

    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Copy a pending inbound packet into `buf`. `WouldBlock` when nothing arrived.
    fn receive(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error>;

    fn enter_receive_mode(&mut self) -> Result<(), Self::Error>;

    /// Largest payload the transport accepts in one packet.
    fn max_payload(&self) -> usize;
}

/// Buzzer and LED wired to the same output.
pub trait Buzzer {
    fn set(&mut self, on: bool);
}

pub trait Watchdog {
    fn feed(&mut self);
}
