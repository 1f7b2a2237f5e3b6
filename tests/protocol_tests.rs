use fieldnode::config::RadioConfig;
use fieldnode::protocol::*;
use fieldnode::RainVote;

fn reference_report() -> Report {
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

fn handler() -> ProtocolHandler {
    ProtocolHandler::new(&RadioConfig::default())
}

#[test]
fn test_outbound_field_order_and_precision() {
    let frame = encode_report(&reference_report(), MAX_OUTBOUND_SIZE).unwrap();
    assert_eq!(frame.as_str(), "20009,1.23,1,5.50,-34.57475,-58.43552,15.0");
}

#[test]
fn test_round_trip_recovers_fields() {
    let report = reference_report();
    let frame = encode_report(&report, MAX_OUTBOUND_SIZE).unwrap();
    let decoded = decode_report(&frame).unwrap();

    assert_eq!(decoded.device_id, report.device_id);
    assert!((decoded.mean_current - report.mean_current).abs() < 0.005);
    assert_eq!(decoded.rain, report.rain);
    assert!((decoded.fuel_l - report.fuel_l).abs() < 0.005);

    let sent = report.position.unwrap();
    let got = decoded.position.unwrap();
    assert!((got.latitude - sent.latitude).abs() < 1e-5);
    assert!((got.longitude - sent.longitude).abs() < 1e-5);
    assert!((got.altitude_m - sent.altitude_m).abs() < 0.05);
}

#[test]
fn test_missing_fix_leaves_position_empty() {
    let report = Report {
        position: None,
        ..reference_report()
    };
    let frame = encode_report(&report, MAX_OUTBOUND_SIZE).unwrap();
    assert_eq!(frame.as_str(), "20009,1.23,1,5.50,,,");
    assert_eq!(decode_report(&frame).unwrap().position, None);
}

#[test]
fn test_position_dropped_to_fit_limit() {
    let report = reference_report();
    let full_len = encode_report(&report, MAX_OUTBOUND_SIZE).unwrap().len();

    let frame = encode_report(&report, full_len - 1).unwrap();
    assert_eq!(frame.as_str(), "20009,1.23,1,5.50,,,");

    let err = encode_report(&report, 10).unwrap_err();
    assert!(matches!(err, ProtocolError::FrameTooLarge { max: 10, .. }));
}

#[test]
fn test_handler_counts_dropped_positions() {
    let mut protocol = handler();
    protocol.limit_outbound(30);
    let frame = protocol.compose(&reference_report()).unwrap();
    assert!(frame.len() <= 30);
    assert_eq!(protocol.get_stats().position_dropped, 1);
    assert_eq!(protocol.max_outbound_len(), 30);
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
        decode_report("20009,1.23,2,5.50,,,"),
        Err(ProtocolError::InvalidField("rain"))
    );
}

#[test]
fn test_own_and_broadcast_accepted() {
    let mut protocol = handler();

    match protocol.parse(b"20009>startAlert").unwrap() {
        Inbound::Accepted(frame) => {
            assert_eq!(frame.destination_id, 20009);
            assert_eq!(frame.payload, "startAlert");
        }
        other => panic!("expected accepted frame, got {:?}", other),
    }

    assert!(matches!(
        protocol.parse(b"29999>startAlert").unwrap(),
        Inbound::Accepted(InboundFrame { destination_id: 29999, .. })
    ));
}

#[test]
fn test_foreign_frames_not_accepted() {
    let mut protocol = handler();

    for raw in [&b"20010>startAlert"[..], b"30009>startAlert", b"2000>x", b"0>startAlert"] {
        assert!(
            matches!(protocol.parse(raw), Ok(Inbound::Foreign { .. })),
            "accepted {:?}",
            core::str::from_utf8(raw)
        );
    }
    assert_eq!(protocol.get_stats().foreign, 4);
    assert_eq!(protocol.get_stats().accepted, 0);
}

#[test]
fn test_malformed_inbound_frames() {
    let mut protocol = handler();

    assert_eq!(protocol.parse(b"startAlert"), Err(ProtocolError::MissingDelimiter));
    assert!(matches!(
        protocol.parse(b">startAlert"),
        Err(ProtocolError::InvalidDestination { .. })
    ));
    assert!(matches!(
        protocol.parse(b"20a09>startAlert"),
        Err(ProtocolError::InvalidDestination { .. })
    ));
    // Seven digits against a six digit limit
    assert!(matches!(
        protocol.parse(b"2000900>startAlert"),
        Err(ProtocolError::InvalidDestination { max_digits: 6 })
    ));

    let mut oversized = b"20009>".to_vec();
    oversized.extend(std::iter::repeat(b'x').take(101));
    assert!(matches!(
        protocol.parse(&oversized),
        Err(ProtocolError::PayloadTooLarge { len: 101, max: 100 })
    ));

    assert_eq!(protocol.get_stats().malformed, 5);
}

#[test]
fn test_empty_payload_is_accepted() {
    let mut protocol = handler();
    assert!(matches!(
        protocol.parse(b"20009>"),
        Ok(Inbound::Accepted(InboundFrame { payload: "", .. }))
    ));
}

#[test]
fn test_payload_kept_after_first_delimiter() {
    let mut protocol = handler();
    match protocol.parse(b"20009>a>b").unwrap() {
        Inbound::Accepted(frame) => assert_eq!(frame.payload, "a>b"),
        other => panic!("expected accepted frame, got {:?}", other),
    }
}
