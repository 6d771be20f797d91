mod support;

use http::HeaderMap;

use h2mux::deframe::frame_message;
use h2mux::frame::Frame;

use support::*;

/// A framed record of exactly `len` bytes on the wire.
fn record(len: usize) -> bytes::Bytes {
    // 5 byte prefix + payload
    frame_message(&vec![0u8; len - 5])
}

#[tokio::test]
async fn connection_window_update_after_half_window() {
    init_log();

    let (transport, mut peer) = started_transport().await;

    let (rec, _events3) = listener();
    let _stream3 = transport.new_stream("Svc/Call", HeaderMap::new(), rec);
    let (rec, _events5) = listener();
    let _stream5 = transport.new_stream("Svc/Call", HeaderMap::new(), rec);
    let _ = peer.next_frame().await;
    let _ = peer.next_frame().await;

    peer.send_frame(response_headers(3, HeaderMap::new()));
    peer.send_frame(response_headers(5, HeaderMap::new()));

    // Four 8 KiB frames, interleaved across the two streams. Each stream
    // sees 16 KiB (below the per-stream threshold); the connection total
    // crosses half the default window on the fourth frame.
    peer.send_frame(data(3, record(8_192), false));
    peer.send_frame(data(5, record(8_192), false));
    peer.send_frame(data(3, record(8_192), false));
    peer.send_frame(data(5, record(8_192), false));

    match peer.next_frame().await {
        Frame::WindowUpdate(update) => {
            assert_eq!(update.stream_id(), 0);
            assert_eq!(update.size_increment(), 32_768);
        }
        other => panic!("expected WINDOW_UPDATE, got {:?}", other),
    }

    // The counter was reset; nothing further is emitted.
    peer.assert_idle().await;
}

#[tokio::test]
async fn stream_window_update_after_half_window() {
    init_log();

    let (transport, mut peer) = started_transport().await;

    let (rec, _events) = listener();
    let _stream = transport.new_stream("Svc/Call", HeaderMap::new(), rec);
    let _ = peer.next_frame().await;

    peer.send_frame(response_headers(3, HeaderMap::new()));

    for _ in 0..4 {
        peer.send_frame(data(3, record(8_192), false));
    }

    // The stream and the connection cross the threshold on the same frame;
    // the per-stream update is emitted first.
    match peer.next_frame().await {
        Frame::WindowUpdate(update) => {
            assert_eq!(update.stream_id(), 3);
            assert_eq!(update.size_increment(), 32_768);
        }
        other => panic!("expected stream WINDOW_UPDATE, got {:?}", other),
    }

    match peer.next_frame().await {
        Frame::WindowUpdate(update) => {
            assert_eq!(update.stream_id(), 0);
            assert_eq!(update.size_increment(), 32_768);
        }
        other => panic!("expected connection WINDOW_UPDATE, got {:?}", other),
    }

    peer.assert_idle().await;
}

#[tokio::test]
async fn paused_stream_defers_window_updates() {
    init_log();

    let (transport, mut peer) = started_transport().await;

    let (rec, _events) = listener();
    let stream = transport.new_stream("Svc/Call", HeaderMap::new(), rec);
    let _ = peer.next_frame().await;

    peer.send_frame(response_headers(3, HeaderMap::new()));

    let pause = stream.pause_window_updates();

    for _ in 0..4 {
        peer.send_frame(data(3, record(8_192), false));
    }

    // Only the connection-level update goes out while paused.
    match peer.next_frame().await {
        Frame::WindowUpdate(update) => assert_eq!(update.stream_id(), 0),
        other => panic!("expected connection WINDOW_UPDATE, got {:?}", other),
    }
    peer.assert_idle().await;

    // Releasing the pause emits the full deferred delta.
    drop(pause);

    match peer.next_frame().await {
        Frame::WindowUpdate(update) => {
            assert_eq!(update.stream_id(), 3);
            assert_eq!(update.size_increment(), 32_768);
        }
        other => panic!("expected stream WINDOW_UPDATE, got {:?}", other),
    }
}

#[tokio::test]
async fn pause_released_below_threshold_emits_nothing() {
    init_log();

    let (transport, mut peer) = started_transport().await;

    let (rec, _events) = listener();
    let stream = transport.new_stream("Svc/Call", HeaderMap::new(), rec);
    let _ = peer.next_frame().await;

    peer.send_frame(response_headers(3, HeaderMap::new()));

    let pause = stream.pause_window_updates();
    peer.send_frame(data(3, record(64), false));
    drop(pause);

    peer.assert_idle().await;
}
