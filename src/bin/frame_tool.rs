use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use fieldnode::commands::CommandDispatcher;
use fieldnode::config::RadioConfig;
use fieldnode::protocol::{
    decode_report, encode_report, parse_inbound, Addressing, Inbound, InboundLimits, Position,
    Report, MAX_OUTBOUND_SIZE,
};
use fieldnode::RainVote;
use std::process;

fn main() {
    let matches = App::new("fieldnode-frame")
        .version("0.1.0")
        .about("🔧 Encode, decode and address-check field node radio frames")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("decode")
                .about("Decode an outbound report")
                .arg(Arg::with_name("frame").required(true).help("e.g. 20009,1.23,1,5.50,,,")),
        )
        .subcommand(
            SubCommand::with_name("encode")
                .about("Encode an outbound report")
                .arg(numeric("id", "Device id").required(true))
                .arg(numeric("current", "Mean leakage current in amperes").required(true))
                .arg(
                    Arg::with_name("rain")
                        .long("rain")
                        .takes_value(true)
                        .possible_values(&["0", "1"])
                        .required(true)
                        .help("Rain vote, 1 for wet"),
                )
                .arg(numeric("fuel", "Fuel level in litres").required(true))
                .arg(numeric("lat", "Latitude in decimal degrees").requires_all(&["lng", "alt"]))
                .arg(numeric("lng", "Longitude in decimal degrees").requires("lat"))
                .arg(numeric("alt", "Altitude in metres").requires("lat"))
                .arg(numeric("max-len", "Transport payload limit")),
        )
        .subcommand(
            SubCommand::with_name("address")
                .about("Check an inbound frame against a node's addressing")
                .arg(Arg::with_name("frame").required(true).help("e.g. 29999>startAlert"))
                .arg(numeric("id", "Own device id"))
                .arg(numeric("class-digits", "Leading digits shared by the device class")),
        )
        .get_matches();

    let json = matches.value_of("format") == Some("json");
    let result = match matches.subcommand() {
        ("decode", Some(sub)) => decode(sub, json),
        ("encode", Some(sub)) => encode(sub, json),
        ("address", Some(sub)) => address(sub, json),
        _ => Ok(()),
    };

    if let Err(message) = result {
        eprintln!("{} {}", "error:".red().bold(), message);
        process::exit(1);
    }
}

fn numeric<'a, 'b>(name: &'a str, help: &'a str) -> Arg<'a, 'b> {
    Arg::with_name(name)
        .long(name)
        .takes_value(true)
        .help(help)
        .validator(|v| match v.parse::<f64>() {
            Ok(_) => Ok(()),
            Err(_) => Err("expected a number".into()),
        })
}

fn parsed<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, String> {
    matches
        .value_of(name)
        .map(|v| v.parse::<T>().map_err(|_| format!("invalid value for --{}: {}", name, v)))
        .transpose()
}

fn required<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T, String> {
    parsed(matches, name)?.ok_or_else(|| format!("--{} is required", name))
}

fn decode(matches: &ArgMatches, json: bool) -> Result<(), String> {
    let frame = matches.value_of("frame").unwrap_or_default();
    let report = decode_report(frame).map_err(|e| e.to_string())?;
    print_report(&report, json)
}

fn encode(matches: &ArgMatches, json: bool) -> Result<(), String> {
    let rain = match matches.value_of("rain") {
        Some("1") => RainVote::Wet,
        _ => RainVote::Dry,
    };
    let position = match parsed::<f64>(matches, "lat")? {
        Some(latitude) => Some(Position {
            latitude,
            longitude: required(matches, "lng")?,
            altitude_m: required(matches, "alt")?,
        }),
        None => None,
    };
    let report = Report {
        device_id: required(matches, "id")?,
        mean_current: required(matches, "current")?,
        rain,
        fuel_l: required(matches, "fuel")?,
        position,
    };
    let max_len = parsed(matches, "max-len")?.unwrap_or(MAX_OUTBOUND_SIZE);

    let frame = encode_report(&report, max_len).map_err(|e| e.to_string())?;
    if json {
        let value = serde_json::json!({ "frame": frame.as_str(), "length": frame.len() });
        println!("{}", value);
    } else {
        println!("{}", frame.as_str().green());
        if report.position.is_some() && frame.ends_with(",,,") {
            println!("{}", "position dropped to fit the payload limit".yellow());
        }
    }
    Ok(())
}

fn address(matches: &ArgMatches, json: bool) -> Result<(), String> {
    let defaults = RadioConfig::default();
    let radio = RadioConfig {
        device_id: parsed(matches, "id")?.unwrap_or(defaults.device_id),
        class_digits: parsed(matches, "class-digits")?.unwrap_or(defaults.class_digits),
        ..defaults
    };
    let addressing = Addressing::from_config(&radio);
    let limits = InboundLimits::from_config(&radio);
    let raw = matches.value_of("frame").unwrap_or_default();

    let verdict = parse_inbound(raw.as_bytes(), &addressing, &limits);
    let dispatcher = CommandDispatcher::new();

    if json {
        let value = match verdict {
            Ok(Inbound::Accepted(frame)) => serde_json::json!({
                "verdict": "accepted",
                "destination": frame.destination_id,
                "payload": frame.payload,
                "command": dispatcher.lookup(frame.payload),
            }),
            Ok(Inbound::Foreign { destination_id }) => serde_json::json!({
                "verdict": "foreign",
                "destination": destination_id,
            }),
            Err(e) => serde_json::json!({ "verdict": "malformed", "error": e.to_string() }),
        };
        println!("{}", value);
        return Ok(());
    }

    println!(
        "node {}  broadcast {}",
        addressing.own_id, addressing.broadcast_id
    );
    match verdict {
        Ok(Inbound::Accepted(frame)) => {
            println!("{} for {}: {:?}", "ACCEPTED".green().bold(), frame.destination_id, frame.payload);
            match dispatcher.lookup(frame.payload) {
                Some(action) => println!("  runs {:?}", action),
                None => println!("  {}", "no matching command, ignored".yellow()),
            }
        }
        Ok(Inbound::Foreign { destination_id }) => {
            println!("{} addressed to {}", "FOREIGN".yellow().bold(), destination_id);
        }
        Err(e) => println!("{} {}", "MALFORMED".red().bold(), e),
    }
    Ok(())
}

fn print_report(report: &Report, json: bool) -> Result<(), String> {
    if json {
        let text = serde_json::to_string_pretty(report).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    println!("{:<10} {}", "device".bold(), report.device_id);
    println!("{:<10} {:.2} A", "current".bold(), report.mean_current);
    println!("{:<10} {}", "rain".bold(), match report.rain {
        RainVote::Wet => "wet",
        RainVote::Dry => "dry",
    });
    println!("{:<10} {:.2} L", "fuel".bold(), report.fuel_l);
    match report.position {
        Some(p) => println!(
            "{:<10} {:.5}, {:.5} @ {:.1} m",
            "position".bold(),
            p.latitude,
            p.longitude,
            p.altitude_m
        ),
        None => println!("{:<10} {}", "position".bold(), "none".dimmed()),
    }
    Ok(())
}
