mod common;

use std::time::Duration;

use common::*;
use ecowatti_bridge::{MockTransport, PollerConfig, SensorPoller, TransportError};
use ecowatti_core::{MemoryAddress, PollResult};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn averages_one_window() {
    let batch = chunked(
        &[measurement(21.0), measurement(21.2), measurement(20.8)],
        5,
    );
    let transport = ScriptedTransport::new(0x40, [batch]);
    let mut poller = SensorPoller::new(transport, poller_config());

    let result = poller.poll(MemoryAddress(0x01)).await.unwrap();

    assert_eq!(result.value(), Some(21.0));
}

#[tokio::test(start_paused = true)]
async fn disconnected_sensor_is_not_averaged() {
    let batch = chunked(&[measurement(20.0), disconnected(), measurement(22.0)], 64);
    let transport = ScriptedTransport::new(0x40, [batch]);
    let mut poller = SensorPoller::new(transport, poller_config());

    let result = poller.poll(MemoryAddress(0x01)).await.unwrap();

    assert_eq!(result.value(), Some(21.0));
}

#[tokio::test(start_paused = true)]
async fn only_disconnected_readings_give_no_reading() {
    let batches = (0..3).map(|_| vec![disconnected()]);
    let transport = ScriptedTransport::new(0x40, batches);
    let mut poller = SensorPoller::new(transport, poller_config());

    let result = poller.poll(MemoryAddress(0x01)).await.unwrap();

    assert_eq!(result, PollResult::NoReading);
}

#[tokio::test(start_paused = true)]
async fn silence_exhausts_attempts_within_bound() {
    let config = poller_config();
    let bound = config.max_poll_duration();
    let transport = ScriptedTransport::new(0x40, []);
    let writes = transport.writes();
    let mut poller = SensorPoller::new(transport, config);

    let started = Instant::now();
    let result = poller.poll(MemoryAddress(0x01)).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result, PollResult::NoReading);
    // Allow for millisecond timer granularity.
    assert!(elapsed <= bound + Duration::from_millis(5), "{elapsed:?} > {bound:?}");
    assert!(elapsed >= Duration::from_millis(10_500), "{elapsed:?}");
    // 3 attempts × 4 destination ids
    assert_eq!(writes.lock().unwrap().len(), 12);
}

#[tokio::test(start_paused = true)]
async fn implausible_window_is_retried() {
    let transport = ScriptedTransport::new(
        0x40,
        [vec![measurement(150.0)], vec![measurement(19.5)]],
    );
    let writes = transport.writes();
    let mut poller = SensorPoller::new(transport, poller_config());

    let result = poller.poll(MemoryAddress(0x01)).await.unwrap();

    assert_eq!(result.value(), Some(19.5));
    assert_eq!(writes.lock().unwrap().len(), 8);
}

#[tokio::test(start_paused = true)]
async fn sweep_covers_every_destination_id_in_order() {
    let transport = ScriptedTransport::new(0x40, [vec![measurement(5.0)]]);
    let writes = transport.writes();
    let mut poller = SensorPoller::new(transport, poller_config());

    poller.poll(MemoryAddress(0x0C)).await.unwrap();

    let writes = writes.lock().unwrap();
    let destinations: Vec<u8> = writes.iter().map(|w| w[6]).collect();
    assert_eq!(destinations, [0x40, 0x41, 0x42, 0x43]);
    assert!(writes.iter().all(|w| w[1] == 0xFD && w[8] == 0x0C));
}

#[tokio::test(start_paused = true)]
async fn keep_alive_frames_do_not_disturb_collection() {
    let batch = chunked(
        &[
            keep_alive(),
            measurement(30.0),
            keep_alive(),
            keep_alive(),
            measurement(31.0),
        ],
        4,
    );
    let transport = ScriptedTransport::new(0x40, [batch]);
    let mut poller = SensorPoller::new(transport, poller_config());

    let result = poller.poll(MemoryAddress(0x01)).await.unwrap();

    assert_eq!(result.value(), Some(30.5));
}

#[tokio::test(start_paused = true)]
async fn truncated_frame_is_never_counted() {
    let mut truncated = measurement(99.0);
    truncated.truncate(7);
    let transport = ScriptedTransport::new(0x40, [vec![measurement(20.0), truncated]]);
    let mut poller = SensorPoller::new(transport, poller_config());

    let result = poller.poll(MemoryAddress(0x01)).await.unwrap();

    assert_eq!(result.value(), Some(20.0));
}

#[tokio::test(start_paused = true)]
async fn transport_failure_ends_the_poll() {
    let mut poller = SensorPoller::new(BrokenTransport, poller_config());

    let result = poller.poll(MemoryAddress(0x01)).await;

    assert!(matches!(result, Err(TransportError::Io(_))));
}

#[tokio::test(start_paused = true)]
async fn reads_simulated_controller() {
    let transport = MockTransport::new(0x42, 0.0, [(0x04, 35.5), (0x01, -7.2)]);
    let mut poller = SensorPoller::new(transport, poller_config());

    assert_eq!(
        poller.poll(MemoryAddress(0x04)).await.unwrap().value(),
        Some(35.5)
    );
    assert_eq!(
        poller.poll(MemoryAddress(0x01)).await.unwrap().value(),
        Some(-7.2)
    );
    assert_eq!(
        poller.poll(MemoryAddress(0x09)).await.unwrap(),
        PollResult::NoReading
    );
}

#[tokio::test(start_paused = true)]
async fn simulated_controller_outside_sweep_is_unreachable() {
    let transport = MockTransport::new(0x60, 0.0, [(0x01, 12.0)]);
    let config = PollerConfig {
        max_attempts: 1,
        ..poller_config()
    };
    let mut poller = SensorPoller::new(transport, config);

    let result = poller.poll(MemoryAddress(0x01)).await.unwrap();

    assert_eq!(result, PollResult::NoReading);
}

#[tokio::test(start_paused = true)]
async fn transport_is_handed_to_the_next_session() {
    let transport = ScriptedTransport::new(
        0x40,
        [vec![measurement(10.0)], vec![measurement(11.0)]],
    );
    let writes = transport.writes();

    let mut first = SensorPoller::new(transport, poller_config());
    assert_eq!(
        first.poll(MemoryAddress(0x01)).await.unwrap().value(),
        Some(10.0)
    );

    let mut second = SensorPoller::new(first.into_transport(), poller_config());
    assert_eq!(
        second.poll(MemoryAddress(0x01)).await.unwrap().value(),
        Some(11.0)
    );
    assert_eq!(writes.lock().unwrap().len(), 8);
}
