use super::*;

#[test]
fn into_delivery_returns_none_for_a_consumer_stream_error() {
    let error = lapin::Error::IOError(std::sync::Arc::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset",
    )));
    assert!(into_delivery(Err(error)).is_none());
}

#[test]
fn publish_and_probe_intervals_match_the_specification() {
    assert_eq!(PUBLISH_TIMEOUT, std::time::Duration::from_secs(5));
    assert_eq!(QUEUE_DEPTH_PROBE_INTERVAL, std::time::Duration::from_secs(15));
}
