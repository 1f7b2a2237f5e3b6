//! # Field Node
//!
//! Core of a battery-powered remote field node: it samples leakage current and
//! rain on a fast tick, estimates fuel level and reads GPS position on a slow
//! tick, aggregates each cycle into one compact comma-separated report sent
//! over a long-range radio, and listens for short addressed commands.
//!
//! ## Features
//!
//! - **Cooperative multi-rate scheduling**: two timing slots checked every pass, no blocking waits
//! - **Rolling sample buffers**: paired current/rain readings, mean and majority vote per cycle
//! - **Fuel estimation**: clamped linear interpolation of an ultrasonic echo
//! - **Position tracking**: incremental NMEA GGA decoding, last fix kept
//! - **Addressed framing**: own-id and class-broadcast filtering of `<dest_id>'>'<payload>`
//! - **Embedded-friendly**: fixed-size buffers, no allocation on the loop path
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldnode::clock::ManualClock;
//! use fieldnode::sim::{CountingWatchdog, LoopbackRadio, MockSensors, RecordingBuzzer};
//! use fieldnode::{FieldNode, NodeConfig};
//!
//! let clock = ManualClock::new(0);
//! let mut node = FieldNode::new(
//!     NodeConfig::default(),
//!     MockSensors::new(1),
//!     LoopbackRadio::new(255),
//!     RecordingBuzzer::default(),
//!     CountingWatchdog::default(),
//!     &clock,
//! )
//! .unwrap();
//! node.start().unwrap();
//!
//! for _ in 0..10 {
//!     clock.advance(2_000);
//!     if let Ok(Some(pass)) = node.poll() {
//!         if let Some(frame) = pass.report {
//!             println!("sent {}", frame);
//!         }
//!     }
//! }
//! assert_eq!(node.get_stats().reports_sent, 1);
//! ```
//!
//! ## Architecture
//!
//! - [`node`] - Main loop orchestrator and public API
//! - [`scheduler`] - Elapsed-time timing slots
//! - [`sampling`] - Current/rain buffers and cycle aggregation
//! - [`fuel`] - Echo to litres conversion
//! - [`gps`] - NMEA position tracking
//! - [`protocol`] - Outbound report encoding and inbound frame parsing
//! - [`commands`] - Payload to action dispatch
//! - [`hal`] - Peripheral traits; [`sim`] provides desktop stand-ins

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::float_cmp)]

pub mod alert;
pub mod clock;
pub mod commands;
pub mod config;
pub mod fuel;
pub mod gps;
pub mod hal;
pub mod node;
pub mod protocol;
pub mod sampling;
pub mod scheduler;
pub mod sim;

// Re-export main public types for convenience
pub use config::NodeConfig;
pub use node::{FieldNode, InboundEvent, NodeError, NodeStats, PassOutcome};
pub use protocol::{Inbound, ProtocolError, ProtocolHandler, Report};
pub use sampling::{RainVote, SamplingManager};
pub use scheduler::{Scheduler, SlotId};
