use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use http::HeaderMap;
use log::{trace, warn};
use tokio::sync::mpsc;

use crate::deframe::Deframer;
use crate::frame::{Data, ErrorCode, Reset, StreamId, WindowUpdate};
use crate::proto::connection::Core;
use crate::proto::streams::FlowControl;
use crate::proto::WindowSize;
use crate::status::Status;

/// Callback surface the application registers per call.
///
/// For a given stream the callbacks are totally ordered and never run
/// concurrently: headers arrive before any message, messages arrive in wire
/// order, and `on_close` is always the final callback.
pub trait StreamListener: Send + 'static {
    fn on_headers(&mut self, headers: HeaderMap);

    fn on_message(&mut self, message: Bytes);

    /// The terminal status. Delivered exactly once; no callback follows it.
    fn on_close(&mut self, status: Status, trailers: HeaderMap);
}

/// Inbound state machine of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InboundPhase {
    Headers,
    Message,
    Status,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutboundPhase {
    Headers,
    Message,
    Status,
}

/// Ordered events flowing to the listener task. Pushed only while the
/// stream's monitor is held, so the queue order is the delivery order and
/// `Close` is always last.
enum StreamEvent {
    Headers(HeaderMap),
    Message(Bytes),
    Close(Status, HeaderMap),
}

/// What the dispatcher should do after an inbound delivery.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Deliver {
    /// Stream stays open.
    Open,
    /// Inbound side completed cleanly; drop the stream from the store and
    /// re-check transport quiescence.
    EndOfStream,
    /// Delivery failed and the stream finished locally; reset it on the
    /// wire, drop it from the store and re-check quiescence.
    Failed,
}

/// Per-call state shared between the application handle, the store and the
/// inbound dispatcher.
pub(crate) struct StreamInner {
    /// Assigned once, under the transport lock; zero until then.
    id: OnceLock<StreamId>,

    /// The stream's monitor: inbound deframing, flow control and the
    /// terminal latch all serialize on it.
    recv: Mutex<Recv>,
}

impl std::fmt::Debug for StreamInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamInner")
            .field("id", &self.id.get())
            .finish()
    }
}

struct Recv {
    phase: InboundPhase,
    out_phase: OutboundPhase,
    deframer: Box<dyn Deframer>,
    flow: FlowControl,
    /// Trailer block stashed until the deframer pipeline drains.
    trailers: Option<HeaderMap>,
    /// Set when the terminal status has been enqueued.
    closed: bool,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl StreamInner {
    /// Creates the stream state and spawns its listener task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        listener: Box<dyn StreamListener>,
        deframer: Box<dyn Deframer>,
    ) -> Arc<StreamInner> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(deliver(rx, listener));

        Arc::new(StreamInner {
            id: OnceLock::new(),
            recv: Mutex::new(Recv {
                phase: InboundPhase::Headers,
                out_phase: OutboundPhase::Headers,
                deframer,
                flow: FlowControl::new(),
                trailers: None,
                closed: false,
                events: tx,
            }),
        })
    }

    /// Called under the transport lock, exactly once.
    pub fn assign_id(&self, id: StreamId) {
        self.id.set(id).expect("stream id already assigned");
        self.recv.lock().unwrap().out_phase = OutboundPhase::Message;
    }

    /// Zero until assigned.
    pub fn id(&self) -> StreamId {
        self.id.get().copied().unwrap_or(StreamId::ZERO)
    }

    pub fn is_closed(&self) -> bool {
        self.recv.lock().unwrap().closed
    }

    /// True once the outbound side reached its terminal phase (cancel) or
    /// the stream finished.
    fn outbound_done(&self) -> bool {
        let recv = self.recv.lock().unwrap();
        recv.closed || recv.out_phase == OutboundPhase::Status
    }

    /// Hands an inbound DATA payload to the deframer and advances the
    /// receive window. The returned delta, if any, is the per-stream
    /// WINDOW_UPDATE to emit; the caller sends it outside the monitor.
    pub fn deliver_data(
        &self,
        payload: Bytes,
        end_stream: bool,
    ) -> (Deliver, Option<WindowSize>) {
        let mut recv = self.recv.lock().unwrap();

        if recv.closed {
            // Already terminal; the payload is counted nowhere and dropped.
            return (Deliver::Open, None);
        }

        let window_update = recv.flow.recv(payload.len() as WindowSize);

        let res = {
            let Recv {
                ref mut deframer,
                ref events,
                ..
            } = *recv;

            deframer.deframe(payload, &mut |message| {
                let _ = events.send(StreamEvent::Message(message));
            })
        };

        if let Err(status) = res {
            finish(&mut recv, status, HeaderMap::new());
            return (Deliver::Failed, window_update);
        }

        if end_stream {
            return (end_inbound(&mut recv), window_update);
        }

        (Deliver::Open, window_update)
    }

    /// Delivers an inbound header block. With `end_stream` the block is the
    /// trailer set; it is stashed until the deframer pipeline has drained so
    /// the listener sees every message first.
    pub fn deliver_headers(&self, fields: HeaderMap, end_stream: bool) -> Deliver {
        let mut recv = self.recv.lock().unwrap();

        if recv.closed {
            return Deliver::Open;
        }

        if !end_stream {
            match recv.phase {
                InboundPhase::Headers => {
                    recv.phase = InboundPhase::Message;
                    let _ = recv.events.send(StreamEvent::Headers(fields));
                }
                phase => {
                    warn!("unexpected HEADERS in phase {:?}; dropping", phase);
                }
            }

            return Deliver::Open;
        }

        recv.trailers = Some(fields);
        recv.phase = InboundPhase::Status;

        end_inbound(&mut recv)
    }

    /// Enqueues the terminal status. Returns false if the stream was
    /// already finished.
    pub fn finish(&self, status: Status, trailers: HeaderMap) -> bool {
        let mut recv = self.recv.lock().unwrap();
        finish(&mut recv, status, trailers)
    }

    pub fn set_outbound_done(&self) {
        self.recv.lock().unwrap().out_phase = OutboundPhase::Status;
    }

    fn suppress_window_updates(&self) {
        self.recv.lock().unwrap().flow.suppress();
    }

    /// Clears suppression; the returned delta is emitted by the caller.
    fn release_window_updates(&self) -> Option<WindowSize> {
        let mut recv = self.recv.lock().unwrap();

        if recv.closed {
            return None;
        }

        recv.flow.release()
    }
}

/// Terminal transition; the Close event is always the last one queued.
fn finish(recv: &mut Recv, status: Status, trailers: HeaderMap) -> bool {
    if recv.closed {
        return false;
    }

    trace!("stream finished; status={}", status);

    recv.closed = true;
    recv.phase = InboundPhase::Closed;
    let _ = recv.events.send(StreamEvent::Close(status, trailers));

    true
}

/// The peer signalled end of stream; everything fed to the deframer must be
/// complete for the stream to end cleanly.
fn end_inbound(recv: &mut Recv) -> Deliver {
    if recv.deframer.has_partial() {
        finish(
            recv,
            Status::internal("End of stream with a partial message"),
            HeaderMap::new(),
        );
        return Deliver::Failed;
    }

    let trailers = recv.trailers.take().unwrap_or_default();
    finish(recv, Status::ok(), trailers);

    Deliver::EndOfStream
}

/// The per-stream listener task: the single consumer of the event queue.
async fn deliver(
    mut rx: mpsc::UnboundedReceiver<StreamEvent>,
    mut listener: Box<dyn StreamListener>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Headers(headers) => listener.on_headers(headers),
            StreamEvent::Message(message) => listener.on_message(message),
            StreamEvent::Close(status, trailers) => {
                listener.on_close(status, trailers);
                return;
            }
        }
    }
}

// ===== public handle =====

/// One logical call multiplexed over the transport.
pub struct Stream {
    core: Arc<Core>,
    inner: Arc<StreamInner>,
}

impl Stream {
    pub(crate) fn new(core: Arc<Core>, inner: Arc<StreamInner>) -> Stream {
        Stream { core, inner }
    }

    /// The assigned stream id, or zero if the transport refused the stream.
    pub fn id(&self) -> u32 {
        self.inner.id().as_u32()
    }

    /// Writes `payload` as a DATA frame.
    ///
    /// # Panics
    ///
    /// Panics if the stream was never assigned an id, or if the payload
    /// does not fit in a single DATA frame (`payload.len()` must be less
    /// than the codec's `max_data_len`). Both are programming errors.
    pub fn send_message(&self, payload: Bytes, end_stream: bool) {
        let id = self.inner.id();
        assert!(!id.is_zero(), "send_message on a stream with no id");
        assert!(
            payload.len() < self.core.max_data_len(),
            "payload exceeds the codec frame limit"
        );

        if self.inner.outbound_done() {
            trace!("discarding message for finished stream {:?}", id);
            return;
        }

        let mut frame = Data::new(id, payload);
        frame.set_end_stream(end_stream);

        self.core.enqueue(frame);
        self.core.enqueue_flush();
    }

    /// Aborts the call. At most one RST_STREAM reaches the wire and the
    /// listener sees CANCELLED exactly once, no matter how many times this
    /// is called.
    pub fn cancel(&self) {
        let id = self.inner.id();

        if id.is_zero() {
            // Only reachable when the constructor observed GOAWAY and the
            // stream was born finished.
            assert!(self.inner.is_closed(), "cancel on an unstarted stream");
            return;
        }

        self.inner.set_outbound_done();

        if self.core.store().remove(id).is_some() {
            self.core.enqueue(Reset::new(id, ErrorCode::CANCEL));
            self.core.enqueue_flush();
            self.inner
                .finish(Status::cancelled("Cancelled"), HeaderMap::new());
            self.core.maybe_stop();
        }
    }

    /// Pauses receive-side flow control credit while the returned guard is
    /// alive. Dropping the guard emits any deferred WINDOW_UPDATE.
    ///
    /// Used by callers applying backpressure: the peer stops being granted
    /// window while buffered messages are still being consumed.
    pub fn pause_window_updates(&self) -> WindowUpdatePause {
        self.inner.suppress_window_updates();

        WindowUpdatePause {
            core: self.core.clone(),
            inner: self.inner.clone(),
        }
    }

    /// True once the terminal status has been delivered (or enqueued).
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("Stream").field("id", &self.id()).finish()
    }
}

/// RAII guard deferring per-stream WINDOW_UPDATE frames.
#[must_use = "window updates resume when the guard is dropped"]
pub struct WindowUpdatePause {
    core: Arc<Core>,
    inner: Arc<StreamInner>,
}

impl Drop for WindowUpdatePause {
    fn drop(&mut self) {
        if let Some(delta) = self.inner.release_window_updates() {
            self.core
                .enqueue(WindowUpdate::new(self.inner.id(), delta));
            self.core.enqueue_flush();
        }
    }
}
