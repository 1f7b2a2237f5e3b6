use crate::alert::{AlertSequencer, HEARTBEAT_ALERT};
use crate::clock::Clock;
use crate::commands::{CommandAction, CommandDispatcher, CommandSink};
use crate::config::{ConfigError, NodeConfig};
use crate::fuel::FuelGauge;
use crate::gps::{PositionFix, PositionTracker};
use crate::hal::{Buzzer, RadioTransport, SensorDriver, Watchdog};
use crate::protocol::{
    min_report_len, Inbound, OutboundFrame, Position, ProtocolError, ProtocolHandler, Report,
    MAX_INBOUND_SIZE,
};
use crate::sampling::{RecordOutcome, ReportRequests, SamplingManager};
use crate::scheduler::{Scheduler, SlotId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

const GPS_CHUNK_SIZE: usize = 64;
/// NMEA receiver output at 9600 baud, 8N1.
pub const GPS_BYTES_PER_SECOND: u64 = 960;

/// Chunks one GPS service may read: everything the receiver can emit in a
/// sampling period plus one chunk of slack.
pub fn gps_chunk_budget(sampling_period_ms: u64) -> usize {
    let bytes = GPS_BYTES_PER_SECOND.saturating_mul(sampling_period_ms) / 1_000;
    let bytes = usize::try_from(bytes).unwrap_or(usize::MAX);
    bytes.div_ceil(GPS_CHUNK_SIZE).saturating_add(1)
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("report composition failed: {0}")]
    Compose(#[from] ProtocolError),
    #[error("radio payload {max_payload} cannot hold a {required}-byte report")]
    TransportTooSmall { required: usize, max_payload: usize },
    #[error("radio error: {0}")]
    Radio(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodeStats {
    pub passes: u64,
    pub samples_taken: u32,
    pub dropped_samples: u32,
    pub fuel_refreshes: u32,
    pub fuel_failures: u32,
    pub gps_bytes: u64,
    pub reports_sent: u32,
    pub send_failures: u32,
    pub frames_received: u32,
    pub accepted_frames: u32,
    pub commands_handled: u32,
    pub unknown_commands: u32,
    pub foreign_frames: u32,
    pub malformed_frames: u32,
}

/// What happened to one inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command(CommandAction),
    UnknownCommand,
    Foreign { destination_id: u32 },
    Malformed(ProtocolError),
}

/// Summary of one main-loop pass.
#[derive(Debug, Clone, Default)]
pub struct PassOutcome {
    pub now_ms: u64,
    pub sample: Option<RecordOutcome>,
    pub fuel_l: Option<f32>,
    pub report: Option<OutboundFrame>,
    pub inbound: Option<InboundEvent>,
}

/// Routes dispatched commands to the alert sequencer.
struct ActionSink<'a, B: ?Sized> {
    alert: &'a mut AlertSequencer,
    buzzer: &'a mut B,
    now_ms: u64,
    executed: Option<CommandAction>,
}

impl<B: Buzzer + ?Sized> CommandSink for ActionSink<'_, B> {
    fn execute(&mut self, action: CommandAction) {
        match action {
            CommandAction::StartAlert { on_ms, beeps } => {
                self.alert.start(on_ms, beeps, self.now_ms, &mut *self.buzzer);
            }
        }
        self.executed = Some(action);
    }
}

/// The remote node: one cooperative pass samples, reports and listens.
///
/// Each [`FieldNode::poll`] call checks both timing slots, does only the work
/// that is due, services any pending sensor requests, advances the alert
/// pattern, handles at most one inbound packet and feeds the watchdog. Nothing
/// in a pass waits on a timer.
pub struct FieldNode<S, R, B, W, C> {
    config: NodeConfig,
    clock: C,

    // Peripherals
    sensors: S,
    radio: R,
    buzzer: B,
    watchdog: W,

    scheduler: Scheduler,
    sampling: SamplingManager,
    report_requests: ReportRequests,
    fuel: FuelGauge,
    tracker: PositionTracker,
    protocol: ProtocolHandler,
    dispatcher: CommandDispatcher,
    alert: AlertSequencer,

    gps_chunk_budget: usize,
    running: bool,
    stats: NodeStats,
    rx_buffer: [u8; MAX_INBOUND_SIZE],
}

impl<S, R, B, W, C> FieldNode<S, R, B, W, C>
where
    S: SensorDriver,
    R: RadioTransport,
    B: Buzzer,
    W: Watchdog,
    C: Clock,
{
    pub fn new(
        config: NodeConfig,
        sensors: S,
        radio: R,
        buzzer: B,
        watchdog: W,
        clock: C,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let mut protocol = ProtocolHandler::new(&config.radio);
        protocol.limit_outbound(radio.max_payload());
        let required = min_report_len(config.radio.device_id, config.fuel.tank_capacity_l);
        if protocol.max_outbound_len() < required {
            return Err(NodeError::TransportTooSmall {
                required,
                max_payload: radio.max_payload(),
            });
        }

        Ok(Self {
            scheduler: Scheduler::starting_at(clock.now_ms()),
            sampling: SamplingManager::new(config.timing.buffer_capacity(), config.rain.tie_break),
            report_requests: ReportRequests::default(),
            fuel: FuelGauge::new(config.fuel.clone()),
            tracker: PositionTracker::new(),
            protocol,
            dispatcher: CommandDispatcher::new(),
            alert: AlertSequencer::new(),
            gps_chunk_budget: gps_chunk_budget(config.timing.sampling_period_ms),
            running: false,
            stats: NodeStats::default(),
            rx_buffer: [0; MAX_INBOUND_SIZE],
            config,
            clock,
            sensors,
            radio,
            buzzer,
            watchdog,
        })
    }

    /// Arm the timing slots, request the first fuel and GPS reads, listen,
    /// and play the boot pattern.
    pub fn start(&mut self) -> Result<(), NodeError> {
        let now = self.clock.now_ms();
        self.scheduler = Scheduler::starting_at(now);
        self.report_requests = ReportRequests { fuel: true, gps: true };
        self.radio
            .enter_receive_mode()
            .map_err(|e| NodeError::Radio(format!("{:?}", e)))?;

        let (on_ms, beeps) = HEARTBEAT_ALERT;
        self.alert.start(on_ms, beeps, now, &mut self.buzzer);
        self.running = true;

        info!(
            device_id = self.config.radio.device_id,
            broadcast_id = self.protocol.addressing().broadcast_id,
            sampling_ms = self.config.timing.sampling_period_ms,
            reporting_ms = self.config.timing.reporting_period_ms,
            capacity = self.sampling.capacity(),
            "field node started"
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.alert.stop(&mut self.buzzer);
        info!("field node stopped");
    }

    /// One pass of the main loop. `Ok(None)` when the node is not running.
    pub fn poll(&mut self) -> Result<Option<PassOutcome>, NodeError> {
        if !self.running {
            return Ok(None);
        }

        let now = self.clock.now_ms();
        let mut outcome = PassOutcome {
            now_ms: now,
            ..PassOutcome::default()
        };
        self.stats.passes = self.stats.passes.wrapping_add(1);

        self.alert.tick(now, &mut self.buzzer);

        if self
            .scheduler
            .due(SlotId::Sample, self.config.timing.sampling_period_ms, now)
        {
            self.sampling.request_refresh();
            self.report_requests.gps = true;
        }

        // Reads wait while the buzzer is playing; the requests stay pending
        if !self.alert.is_active() {
            outcome.sample = self.service_sensors();
            outcome.fuel_l = self.service_fuel();
            self.service_gps();
        }

        let mut result = Ok(());
        if self
            .scheduler
            .due(SlotId::Report, self.config.timing.reporting_period_ms, now)
        {
            match self.report_cycle(now) {
                Ok(frame) => outcome.report = Some(frame),
                Err(e) => result = Err(e),
            }
        }

        outcome.inbound = self.poll_radio(now);

        self.watchdog.feed();
        result.map(|()| Some(outcome))
    }

    fn service_sensors(&mut self) -> Option<RecordOutcome> {
        let recorded = self
            .sampling
            .service(&mut self.sensors, &self.config.current, &self.config.rain);

        match recorded {
            Some(RecordOutcome::Stored { .. }) => {
                self.stats.samples_taken = self.stats.samples_taken.wrapping_add(1);
            }
            Some(RecordOutcome::Dropped) => {
                self.stats.dropped_samples = self.stats.dropped_samples.wrapping_add(1);
                trace!("sample buffers full, reading dropped");
            }
            None => {}
        }
        recorded
    }

    fn service_fuel(&mut self) -> Option<f32> {
        if !self.report_requests.fuel {
            return None;
        }

        self.report_requests.fuel = false;
        let echo_us = self
            .sensors
            .read_fuel_echo_median(self.config.fuel.ping_samples);

        match echo_us.and_then(|echo_us| self.fuel.refresh(echo_us)) {
            Some(level) => {
                self.stats.fuel_refreshes = self.stats.fuel_refreshes.wrapping_add(1);
                debug!(echo_us = ?echo_us, level_l = level, "fuel level refreshed");
                Some(level)
            }
            None => {
                self.stats.fuel_failures = self.stats.fuel_failures.wrapping_add(1);
                warn!(level_l = self.fuel.level(), "no fuel echo, keeping last level");
                None
            }
        }
    }

    fn service_gps(&mut self) {
        if !self.report_requests.gps {
            return;
        }

        let mut chunk = [0u8; GPS_CHUNK_SIZE];
        for _ in 0..self.gps_chunk_budget {
            let count = self.sensors.read_gps_bytes(&mut chunk);
            if count == 0 {
                break;
            }
            self.tracker.feed(&chunk[..count]);
            self.stats.gps_bytes = self.stats.gps_bytes.wrapping_add(count as u64);
        }
        self.report_requests.gps = false;
    }

    /// Flush, compose, transmit, listen again, and ask for a fresh fuel reading.
    fn report_cycle(&mut self, now: u64) -> Result<OutboundFrame, NodeError> {
        let aggregate = self.sampling.flush();
        debug!(
            mean_current = aggregate.mean_current,
            rain = ?aggregate.rain,
            samples = aggregate.samples,
            "sample buffers flushed"
        );

        let report = Report {
            device_id: self.config.radio.device_id,
            mean_current: aggregate.mean_current,
            rain: aggregate.rain,
            fuel_l: self.fuel.level(),
            position: Position::from_fix(&self.tracker.read()),
        };
        self.report_requests.fuel = true;

        let frame = self.protocol.compose(&report)?;

        let sent = self.radio.send(frame.as_bytes());
        let listening = self.radio.enter_receive_mode();

        let (on_ms, beeps) = HEARTBEAT_ALERT;
        self.alert.start(on_ms, beeps, now, &mut self.buzzer);

        if let Err(e) = sent {
            self.stats.send_failures = self.stats.send_failures.wrapping_add(1);
            warn!(error = ?e, "report transmission failed");
            return Err(NodeError::Radio(format!("{:?}", e)));
        }
        listening.map_err(|e| NodeError::Radio(format!("{:?}", e)))?;

        self.stats.reports_sent = self.stats.reports_sent.wrapping_add(1);
        info!(frame = frame.as_str(), "report transmitted");
        Ok(frame)
    }

    /// Handle at most one pending inbound packet. Foreign, malformed and
    /// unknown frames are counted and dropped.
    fn poll_radio(&mut self, now: u64) -> Option<InboundEvent> {
        let len = match self.radio.receive(&mut self.rx_buffer) {
            Ok(len) => len,
            Err(nb::Error::WouldBlock) => return None,
            Err(nb::Error::Other(e)) => {
                warn!(error = ?e, "radio receive failed");
                return None;
            }
        };
        self.stats.frames_received = self.stats.frames_received.wrapping_add(1);

        let event = match self.protocol.parse(&self.rx_buffer[..len]) {
            Ok(Inbound::Accepted(frame)) => {
                self.stats.accepted_frames = self.stats.accepted_frames.wrapping_add(1);
                let mut sink = ActionSink {
                    alert: &mut self.alert,
                    buzzer: &mut self.buzzer,
                    now_ms: now,
                    executed: None,
                };
                if self.dispatcher.dispatch(frame.payload, &mut sink) {
                    self.stats.commands_handled = self.stats.commands_handled.wrapping_add(1);
                    sink.executed.map_or(InboundEvent::UnknownCommand, InboundEvent::Command)
                } else {
                    self.stats.unknown_commands = self.stats.unknown_commands.wrapping_add(1);
                    InboundEvent::UnknownCommand
                }
            }
            Ok(Inbound::Foreign { destination_id }) => {
                self.stats.foreign_frames = self.stats.foreign_frames.wrapping_add(1);
                trace!(destination_id, "frame for another node");
                InboundEvent::Foreign { destination_id }
            }
            Err(e) => {
                self.stats.malformed_frames = self.stats.malformed_frames.wrapping_add(1);
                debug!(error = %e, "malformed frame dropped");
                InboundEvent::Malformed(e)
            }
        };
        Some(event)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn get_stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn sampling(&self) -> &SamplingManager {
        &self.sampling
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn report_requests(&self) -> ReportRequests {
        self.report_requests
    }

    pub fn fuel_level(&self) -> f32 {
        self.fuel.level()
    }

    pub fn position(&self) -> PositionFix {
        self.tracker.read()
    }

    pub fn alert(&self) -> &AlertSequencer {
        &self.alert
    }

    pub fn protocol(&self) -> &ProtocolHandler {
        &self.protocol
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn buzzer(&self) -> &B {
        &self.buzzer
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_budget_covers_receiver_output() {
        // 2 s at 960 B/s is 1920 bytes: 30 chunks plus slack
        assert_eq!(gps_chunk_budget(2_000), 31);
        assert!(gps_chunk_budget(2_000) * GPS_CHUNK_SIZE >= 1_920);
        assert_eq!(gps_chunk_budget(0), 1);
        assert!(gps_chunk_budget(60_000) * GPS_CHUNK_SIZE >= 57_600);
    }
}
