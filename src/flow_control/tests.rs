use super::negotiator::{
    FlowControlNegotiator, WindowAdvertisement, WindowScope, WindowUpdate, negotiate_initial,
};
use super::tuner::RttAutoTuner;
use crate::config::FlowControlConfig;
use crate::error::Error;
use crate::types::StreamId;
use tokio::time::{Duration, Instant};

fn create_test_negotiator() -> FlowControlNegotiator {
    FlowControlNegotiator::new(FlowControlConfig::default(), Box::new(RttAutoTuner))
}

#[test]
fn test_negotiate_unspecified_uses_default() {
    let config = FlowControlConfig::default();
    assert_eq!(
        negotiate_initial(&config, WindowScope::Stream, WindowAdvertisement::Unspecified),
        Ok(32 * 1024)
    );
    assert_eq!(
        negotiate_initial(&config, WindowScope::Connection, WindowAdvertisement::Unspecified),
        Ok(48 * 1024)
    );
}

#[test]
fn test_negotiate_plain_advertisement_is_clamped_to_default() {
    let config = FlowControlConfig::default();
    assert_eq!(
        negotiate_initial(&config, WindowScope::Stream, WindowAdvertisement::Advertised(1000)),
        Ok(1000)
    );
    assert_eq!(
        negotiate_initial(
            &config,
            WindowScope::Stream,
            WindowAdvertisement::Advertised(500 * 1024)
        ),
        Ok(32 * 1024)
    );
}

#[test]
fn test_negotiate_raised_advertisement_is_kept() {
    let config = FlowControlConfig::default();
    assert_eq!(
        negotiate_initial(&config, WindowScope::Stream, WindowAdvertisement::Raised(500 * 1024)),
        Ok(500 * 1024)
    );
}

#[test]
fn test_negotiate_rejects_values_above_scope_maximum() {
    let config = FlowControlConfig::default();
    // 1.2 MiB fits the connection maximum but not the stream maximum.
    let value = 1024 * 1024 + 200 * 1024;
    assert!(matches!(
        negotiate_initial(&config, WindowScope::Stream, WindowAdvertisement::Raised(value)),
        Err(Error::NegotiationFailed { max, .. }) if max == 1024 * 1024
    ));
    assert_eq!(
        negotiate_initial(&config, WindowScope::Connection, WindowAdvertisement::Raised(value)),
        Ok(value)
    );

    let err = negotiate_initial(
        &config,
        WindowScope::Connection,
        WindowAdvertisement::Advertised(2 * 1024 * 1024),
    )
    .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_stream_consumption_checks_both_levels() {
    let mut config = FlowControlConfig::default();
    config.stream_receive_window = 100;
    config.connection_receive_window = 150;
    let mut negotiator = FlowControlNegotiator::new(config, Box::new(RttAutoTuner));
    negotiator.open_stream(StreamId(1));
    negotiator.open_stream(StreamId(3));

    negotiator.on_data_consumed(StreamId(1), 100).unwrap();
    // Stream 3 fits its own window but not the connection's.
    let err = negotiator.on_data_consumed(StreamId(3), 60).unwrap_err();
    assert!(matches!(err, Error::FlowControlViolation { window: 150, .. }));

    // Nothing was charged for the rejected frame.
    assert_eq!(negotiator.stream_window(StreamId(3)).unwrap().consumed(), 0);
    assert_eq!(negotiator.connection_window().consumed(), 100);

    negotiator.on_data_consumed(StreamId(3), 50).unwrap();
    assert_eq!(negotiator.connection_window().remaining(), 0);
}

#[test]
fn test_consumed_never_exceeds_current() {
    let mut negotiator = create_test_negotiator();
    let id = StreamId(1);
    negotiator.open_stream(id);
    let mut accepted = 0u64;
    for chunk in [1000u64, 7000, 20_000, 4_000, 1_000, 768, 1, 5_000] {
        if negotiator.on_data_consumed(id, chunk).is_ok() {
            accepted += chunk;
        }
        let window = negotiator.stream_window(id).unwrap();
        assert!(window.consumed() <= window.current());
        assert!(window.current() <= window.max());
    }
    assert_eq!(accepted, 32 * 1024);
}

#[test]
fn test_apply_initial_windows() {
    let mut negotiator = create_test_negotiator();
    negotiator
        .apply_initial_windows(
            WindowAdvertisement::Raised(64 * 1024),
            WindowAdvertisement::Unspecified,
        )
        .unwrap();
    assert_eq!(negotiator.stream_initial_window(), 64 * 1024);
    assert_eq!(negotiator.connection_window().current(), 48 * 1024);

    negotiator.open_stream(StreamId(1));
    assert_eq!(negotiator.stream_window(StreamId(1)).unwrap().current(), 64 * 1024);

    assert!(
        negotiator
            .apply_initial_windows(
                WindowAdvertisement::Raised(2 * 1024 * 1024),
                WindowAdvertisement::Unspecified,
            )
            .is_err()
    );
    // A failed negotiation leaves the previous result in place.
    assert_eq!(negotiator.stream_initial_window(), 64 * 1024);
}

#[test]
fn test_window_updates_after_retirement() {
    let mut negotiator = create_test_negotiator();
    let now = Instant::now();
    let rtt = Duration::from_millis(50);
    let id = StreamId(1);
    negotiator.open_stream(id);

    negotiator.on_data_consumed(id, 20 * 1024).unwrap();
    negotiator.on_data_retired(id, 10 * 1024);
    assert!(negotiator.window_updates(rtt, now).is_empty());

    negotiator.on_data_retired(id, 6 * 1024);
    let updates = negotiator.window_updates(rtt, now);
    assert_eq!(
        updates,
        vec![WindowUpdate {
            stream_id: Some(id),
            window: 32 * 1024
        }]
    );
}

#[test]
fn test_auto_tune_grows_stream_and_connection() {
    let mut negotiator = create_test_negotiator();
    let start = Instant::now();
    let rtt = Duration::from_millis(50);
    let id = StreamId(1);
    negotiator.open_stream(id);

    // First update establishes the reference time; no tuning without history.
    negotiator.on_data_consumed(id, 16 * 1024).unwrap();
    negotiator.on_data_retired(id, 16 * 1024);
    let first = negotiator.window_updates(rtt, start);
    assert!(first.contains(&WindowUpdate {
        stream_id: Some(id),
        window: 32 * 1024
    }));

    // Half the window is burned again within two RTTs: the window doubles.
    let soon = start + Duration::from_millis(60);
    negotiator.on_data_consumed(id, 16 * 1024).unwrap();
    negotiator.on_data_retired(id, 16 * 1024);
    let second = negotiator.window_updates(rtt, soon);
    assert!(second.contains(&WindowUpdate {
        stream_id: Some(id),
        window: 64 * 1024
    }));

    // The connection window follows to 1.5x the stream window.
    assert_eq!(negotiator.connection_window().current(), 96 * 1024);
}

#[test]
fn test_auto_tune_never_exceeds_maximum() {
    let mut negotiator = create_test_negotiator();
    let mut now = Instant::now();
    let rtt = Duration::from_millis(50);
    let id = StreamId(1);
    negotiator.open_stream(id);

    for _ in 0..20 {
        let window = negotiator.stream_window(id).unwrap().current();
        let half = window / 2;
        negotiator.on_data_consumed(id, half).unwrap();
        negotiator.on_data_retired(id, half);
        negotiator.window_updates(rtt, now);
        now += Duration::from_millis(10);
    }

    let stream = negotiator.stream_window(id).unwrap();
    assert_eq!(stream.current(), 1024 * 1024);
    let connection = negotiator.connection_window();
    assert_eq!(connection.current(), connection.max());
}

#[test]
fn test_close_stream_forgets_window() {
    let mut negotiator = create_test_negotiator();
    negotiator.open_stream(StreamId(5));
    assert!(negotiator.stream_window(StreamId(5)).is_some());
    assert!(negotiator.close_stream(StreamId(5)));
    assert!(negotiator.stream_window(StreamId(5)).is_none());
    assert!(!negotiator.close_stream(StreamId(5)));
}

#[test]
fn test_data_on_unopened_stream_is_rejected() {
    let mut negotiator = create_test_negotiator();
    assert_eq!(
        negotiator.on_data_consumed(StreamId(2), 10),
        Err(Error::UnknownStream { id: 2 })
    );
    for id in (1..2001).step_by(2) {
        assert!(negotiator.on_data_consumed(StreamId(id), 10).is_err());
    }
    assert!(negotiator.stream_window(StreamId(2)).is_none());
    assert!(negotiator.stream_window(StreamId(1)).is_none());
    assert_eq!(negotiator.connection_window().consumed(), 0);
}

#[test]
fn test_connection_credit_follows_stream_retirement() {
    let mut negotiator = create_test_negotiator();
    negotiator.open_stream(StreamId(1));
    negotiator.open_stream(StreamId(3));
    negotiator.on_data_consumed(StreamId(1), 10).unwrap();
    negotiator.on_data_consumed(StreamId(3), 30_000).unwrap();

    // Reading more than stream 1 holds returns only its 10 bytes.
    assert_eq!(negotiator.on_data_retired(StreamId(1), 30_000), 10);
    assert_eq!(negotiator.on_data_retired(StreamId(99), 10), 0);
    assert_eq!(negotiator.connection_window().consumed(), 30_000);
    assert_eq!(
        negotiator.stream_window(StreamId(3)).unwrap().consumed(),
        30_000
    );
}

#[test]
fn test_closing_stream_releases_unread_connection_credit() {
    let mut negotiator = create_test_negotiator();
    negotiator.open_stream(StreamId(1));
    negotiator.open_stream(StreamId(3));
    negotiator.on_data_consumed(StreamId(1), 20_000).unwrap();
    negotiator.on_data_consumed(StreamId(3), 5_000).unwrap();

    assert!(negotiator.close_stream(StreamId(1)));
    assert_eq!(negotiator.connection_window().consumed(), 5_000);
    assert!(!negotiator.close_stream(StreamId(777)));
    assert_eq!(negotiator.connection_window().consumed(), 5_000);
}
