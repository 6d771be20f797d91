//! In-memory codec halves and a recording listener for driving a transport
//! without a socket.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio::sync::mpsc;

use h2mux::codec::{FrameReader, FrameWriter};
use h2mux::frame::{Data, Frame, HeaderBlock, Headers, Pseudo, StreamId};
use h2mux::{Status, StreamListener, Transport, TransportState};

pub const MAX_DATA_LEN: usize = 16_384;

/// Everything the transport applied to its writer half, in order.
#[derive(Debug)]
pub enum Written {
    Preface,
    Frame(Frame),
    Flush,
    Shutdown,
}

/// The far side of the in-memory connection.
pub struct Peer {
    to_transport: Option<mpsc::UnboundedSender<io::Result<Frame>>>,
    written: mpsc::UnboundedReceiver<Written>,
    fail_writes: Arc<AtomicBool>,
}

pub struct MockReader {
    rx: mpsc::UnboundedReceiver<io::Result<Frame>>,
}

pub struct MockWriter {
    tx: mpsc::UnboundedSender<Written>,
    fail_writes: Arc<AtomicBool>,
}

/// Builds an unstarted transport wired to a mock peer.
pub fn transport() -> (Transport, Peer) {
    transport_with(|b| b)
}

pub fn transport_with(
    configure: impl FnOnce(h2mux::Builder) -> h2mux::Builder,
) -> (Transport, Peer) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));

    let reader = MockReader { rx: frame_rx };
    let writer = MockWriter {
        tx: written_tx,
        fail_writes: fail_writes.clone(),
    };

    let transport = configure(Transport::builder("example.com:50051")).from_parts(reader, writer);

    let peer = Peer {
        to_transport: Some(frame_tx),
        written: written_rx,
        fail_writes,
    };

    (transport, peer)
}

pub async fn started_transport() -> (Transport, Peer) {
    let (transport, peer) = transport();
    transport.start().await.unwrap();
    (transport, peer)
}

impl Peer {
    pub fn send_frame(&self, frame: impl Into<Frame>) {
        self.to_transport
            .as_ref()
            .expect("peer closed")
            .send(Ok(frame.into()))
            .unwrap();
    }

    pub fn send_error(&self, err: io::Error) {
        self.to_transport
            .as_ref()
            .expect("peer closed")
            .send(Err(err))
            .unwrap();
    }

    /// Clean EOF from the peer's side.
    pub fn close(&mut self) {
        self.to_transport = None;
    }

    /// Makes every subsequent codec write fail.
    pub fn break_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Next write applied to the codec, flushes skipped.
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            match timed(self.written.recv()).await.expect("writer closed") {
                Written::Frame(frame) => return frame,
                Written::Flush => {}
                other => panic!("expected frame, got {:?}", other),
            }
        }
    }

    pub async fn next_written(&mut self) -> Written {
        timed(self.written.recv()).await.expect("writer closed")
    }

    /// Asserts nothing but flushes reached the wire.
    pub async fn assert_idle(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;

        loop {
            match self.written.try_recv() {
                Ok(Written::Flush) => {}
                Ok(other) => panic!("unexpected write: {:?}", other),
                Err(_) => return,
            }
        }
    }

    /// Like `assert_idle`, but tolerates the GOAWAY a graceful stop queues.
    pub async fn assert_idle_except_goaway(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;

        loop {
            match self.written.try_recv() {
                Ok(Written::Flush) | Ok(Written::Frame(Frame::GoAway(..))) => {}
                Ok(other) => panic!("unexpected write: {:?}", other),
                Err(_) => return,
            }
        }
    }
}

#[async_trait]
impl FrameReader for MockReader {
    async fn next(&mut self) -> io::Result<Option<Frame>> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FrameWriter for MockWriter {
    async fn connection_preface(&mut self) -> io::Result<()> {
        self.write_event(Written::Preface)
    }

    async fn write(&mut self, frame: Frame) -> io::Result<()> {
        self.write_event(Written::Frame(frame))
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.write_event(Written::Flush)
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.write_event(Written::Shutdown)
    }

    fn max_data_len(&self) -> usize {
        MAX_DATA_LEN
    }
}

impl MockWriter {
    fn write_event(&self, event: Written) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken"));
        }

        self.tx
            .send(event)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }
}

// ===== listener =====

#[derive(Debug, PartialEq)]
pub enum Event {
    Headers(HeaderMap),
    Message(Bytes),
    Close(Status, HeaderMap),
}

pub struct Recording {
    tx: mpsc::UnboundedSender<Event>,
}

pub struct Events {
    rx: mpsc::UnboundedReceiver<Event>,
}

/// A listener that records callbacks for later assertion.
pub fn listener() -> (Recording, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recording { tx }, Events { rx })
}

impl StreamListener for Recording {
    fn on_headers(&mut self, headers: HeaderMap) {
        let _ = self.tx.send(Event::Headers(headers));
    }

    fn on_message(&mut self, message: Bytes) {
        let _ = self.tx.send(Event::Message(message));
    }

    fn on_close(&mut self, status: Status, trailers: HeaderMap) {
        let _ = self.tx.send(Event::Close(status, trailers));
    }
}

impl Events {
    pub async fn next(&mut self) -> Event {
        timed(self.rx.recv()).await.expect("listener gone")
    }

    pub async fn expect_headers(&mut self) -> HeaderMap {
        match self.next().await {
            Event::Headers(headers) => headers,
            other => panic!("expected headers, got {:?}", other),
        }
    }

    pub async fn expect_message(&mut self) -> Bytes {
        match self.next().await {
            Event::Message(message) => message,
            other => panic!("expected message, got {:?}", other),
        }
    }

    pub async fn expect_close(&mut self) -> (Status, HeaderMap) {
        match self.next().await {
            Event::Close(status, trailers) => (status, trailers),
            other => panic!("expected close, got {:?}", other),
        }
    }

    /// Asserts the stream delivered nothing further; in particular that no
    /// callback followed a terminal status.
    pub async fn assert_done(&mut self) {
        let trailing = timed(self.rx.recv()).await;
        assert!(trailing.is_none(), "unexpected trailing event: {:?}", trailing);
    }
}

// ===== frame helpers =====

pub fn response_headers(id: u32, fields: HeaderMap) -> Headers {
    Headers::new(
        StreamId::new(id),
        HeaderBlock {
            pseudo: Pseudo {
                status: Some(StatusCode::OK),
                ..Pseudo::default()
            },
            fields,
        },
    )
}

pub fn trailers(id: u32, fields: HeaderMap) -> Headers {
    Headers::trailers(StreamId::new(id), fields)
}

pub fn data(id: u32, payload: impl Into<Bytes>, end_stream: bool) -> Data {
    let mut frame = Data::new(StreamId::new(id), payload.into());
    frame.set_end_stream(end_stream);
    frame
}

/// Waits for the transport to publish `expected`.
pub async fn await_state(transport: &Transport, expected: TransportState) {
    let mut rx = transport.state();

    timed(async {
        loop {
            if *rx.borrow_and_update() == expected {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
}

/// Waits for the transport to fail, returning the failure status.
pub async fn await_failed(transport: &Transport) -> Status {
    let mut rx = transport.state();

    timed(async {
        loop {
            let failed = match &*rx.borrow_and_update() {
                TransportState::Failed(status) => Some(status.clone()),
                _ => None,
            };

            if let Some(status) = failed {
                return status;
            }

            rx.changed().await.unwrap();
        }
    })
    .await
}

pub async fn timed<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("test timed out")
}

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}
