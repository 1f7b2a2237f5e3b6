use clap::{App, Arg};
use colored::*;
use fieldnode::clock::{Clock, ManualClock};
use fieldnode::sim::{CountingWatchdog, LoopbackRadio, MockSensors, RecordingBuzzer};
use fieldnode::{FieldNode, InboundEvent, NodeConfig};
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn, Level};

const TICK_MS: u64 = 100;
const DEFAULT_RADIO_PAYLOAD: usize = 255;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("fieldnode-sim")
        .version("0.1.0")
        .about("📡 Runs a field node against simulated sensors and a loopback radio")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON node configuration; missing fields take defaults")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("speed")
                .short("s")
                .long("speed")
                .value_name("FACTOR")
                .help("Simulated milliseconds per real millisecond")
                .takes_value(true)
                .default_value("10")
                .validator(|v| match v.parse::<u64>() {
                    Ok(n) if n > 0 => Ok(()),
                    _ => Err("Speed must be a positive integer".into()),
                }),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("SECONDS")
                .help("Simulated run time; runs until Ctrl+C when omitted")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Duration must be a number of seconds".into()),
                }),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for the simulated sensors")
                .takes_value(true)
                .default_value("1"),
        )
        .arg(
            Arg::with_name("inject")
                .short("i")
                .long("inject")
                .value_name("FRAME")
                .help("Inbound frame to deliver, e.g. 20009>startAlert (repeatable)")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log sampling and dispatch details"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match matches.value_of("config") {
        Some(path) => NodeConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => NodeConfig::default(),
    };
    let speed: u64 = matches.value_of("speed").unwrap_or("10").parse()?;
    let seed: u32 = matches.value_of("seed").unwrap_or("1").parse()?;
    let limit_ms = match matches.value_of("duration") {
        Some(secs) => Some(secs.parse::<u64>()?.saturating_mul(1000)),
        None => None,
    };

    println!("{}", "📡 Field Node Simulator".bold());
    println!("=======================");
    println!(
        "device {}  broadcast {}  sample every {} ms  report every {} ms  x{}",
        config.radio.device_id,
        config.radio.broadcast_id(),
        config.timing.sampling_period_ms,
        config.timing.reporting_period_ms,
        speed
    );

    let mut radio = LoopbackRadio::new(DEFAULT_RADIO_PAYLOAD);
    for frame in matches.values_of("inject").into_iter().flatten() {
        radio.inject(frame.as_bytes());
    }

    let clock = ManualClock::new(0);
    let mut node = FieldNode::new(
        config,
        MockSensors::new(seed),
        radio,
        RecordingBuzzer::default(),
        CountingWatchdog::default(),
        &clock,
    )?;
    node.start()?;

    let mut interval = time::interval(Duration::from_millis(TICK_MS));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                info!("interrupt received");
                break;
            }
        }

        clock.advance(TICK_MS * speed);

        match node.poll() {
            Ok(Some(pass)) => {
                if let Some(frame) = pass.report {
                    println!("{} {:>8} ms  {}", "TX".green().bold(), pass.now_ms, frame);
                }
                if let Some(event) = pass.inbound {
                    print_inbound(pass.now_ms, &event);
                }
            }
            Ok(None) => break,
            Err(e) => error!("❌ pass failed: {}", e),
        }

        if limit_ms.map_or(false, |limit| clock.now_ms() >= limit) {
            break;
        }
    }

    node.stop();
    if node.radio().pending_inbound() > 0 {
        warn!(pending = node.radio().pending_inbound(), "injected frames not delivered");
    }

    println!("{}", "Run statistics".bold());
    println!("{}", serde_json::to_string_pretty(node.get_stats())?);
    println!("{}", serde_json::to_string_pretty(node.protocol().get_stats())?);
    Ok(())
}

fn print_inbound(now_ms: u64, event: &InboundEvent) {
    let tag = "RX".cyan().bold();
    match event {
        InboundEvent::Command(action) => {
            println!("{} {:>8} ms  command {:?}", tag, now_ms, action);
        }
        InboundEvent::UnknownCommand => {
            println!("{} {:>8} ms  {}", tag, now_ms, "unknown command ignored".yellow());
        }
        InboundEvent::Foreign { destination_id } => {
            println!("{} {:>8} ms  for node {}, ignored", tag, now_ms, destination_id);
        }
        InboundEvent::Malformed(e) => {
            println!("{} {:>8} ms  {}", tag, now_ms, format!("malformed: {}", e).red());
        }
    }
}
