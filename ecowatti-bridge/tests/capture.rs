mod common;

use std::time::Duration;

use common::*;
use ecowatti_bridge::{CapturedFrame, capture};
use ecowatti_core::protocol::RequestPacket;
use tokio_util::sync::CancellationToken;

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_for_timer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        cancel_for_timer.cancel();
    });
    cancel
}

#[tokio::test(start_paused = true)]
async fn logs_every_frame_without_writing() {
    let request = RequestPacket::new(0xFD, 0x41, 0x0C).encode().to_vec();
    let chunks = chunked(
        &[request, keep_alive(), measurement(4.2), disconnected()],
        3,
    );
    let mut transport = ScriptedTransport::with_pending(chunks);
    let writes = transport.writes();

    let mut frames: Vec<CapturedFrame> = Vec::new();
    let captured = capture(
        &mut transport,
        &poller_config(),
        cancel_after(Duration::from_secs(5)),
        |frame| frames.push(frame),
    )
    .await
    .unwrap();

    assert_eq!(captured, 3);
    assert_eq!(frames.len(), 3);
    assert!(writes.lock().unwrap().is_empty());

    let request = RequestPacket::from_frame(&frames[0].frame).unwrap();
    assert_eq!(request.memory_address, 0x0C);
    assert_eq!(request.destination_id, 0x41);

    let line = frames[0].to_string();
    assert!(line.contains(" id=FD size=7 "), "{line}");
    assert!(line.contains(" memory_address=0C"), "{line}");

    assert_eq!(
        frames[1].frame.measurement().map(|m| m.value()),
        Some(4.2)
    );
    assert!(frames[2].frame.measurement().unwrap().is_disconnected());
}

#[tokio::test(start_paused = true)]
async fn stops_on_cancellation_of_a_silent_bus() {
    let mut transport = ScriptedTransport::with_pending(Vec::new());

    let captured = capture(
        &mut transport,
        &poller_config(),
        cancel_after(Duration::from_secs(30)),
        |_| {},
    )
    .await
    .unwrap();

    assert_eq!(captured, 0);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_ends_capture() {
    let result = capture(
        &mut BrokenTransport,
        &poller_config(),
        CancellationToken::new(),
        |_| {},
    )
    .await;

    assert!(result.is_err());
}
