//! The transport core: shared state, the inbound dispatcher and the
//! lifecycle supervisor.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};

use http::HeaderMap;
use log::{debug, trace, warn};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};

use crate::codec::{Codec, FrameReader, FrameWriter};
use crate::deframe::Deframer;
use crate::frame::{
    self, ErrorCode, Frame, GoAway, HeaderBlock, Headers, Ping, Reset, Settings, StreamId,
    WindowUpdate,
};
use crate::proto::streams::{Deliver, FlowControl, Store, Stream, StreamInner, StreamListener};
use crate::proto::PingPayload;
use crate::status::Status;

/// Observable transport lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    New,
    Running,
    Stopping,
    Stopped,
    Failed(Status),
}

/// Fallback DATA limit used before the codec has advertised one.
const DEFAULT_MAX_DATA_LEN: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    New,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// How the connection is obtained at `start`.
pub(crate) enum Io {
    /// Dial the endpoint and split it through the codec.
    Endpoint {
        addr: SocketAddr,
        codec: Box<dyn Codec>,
    },
    /// Preconstructed halves; dialing and the preface are skipped.
    Parts {
        reader: Box<dyn FrameReader>,
        writer: Box<dyn FrameWriter>,
    },
}

/// State guarded by the transport lock.
struct State {
    phase: Phase,

    /// Next client-initiated stream id; odd, strictly increasing.
    next_stream_id: StreamId,

    /// Once set, no new stream is assigned an id.
    go_away: bool,

    /// Status applied to streams refused or aborted because of GOAWAY.
    go_away_status: Option<Status>,

    /// Terminal latch; set exactly once.
    stopped: bool,

    /// Set by `abort`; keeps the terminal state at Failed.
    failed: bool,

    /// Taken by `start`.
    io: Option<Io>,
}

struct Pings {
    next: u64,
    outstanding: HashMap<u64, oneshot::Sender<Result<(), Status>>>,
}

/// The transport core, shared by the public handle, every stream handle and
/// the two I/O tasks.
pub(crate) struct Core {
    authority: String,
    settings: Settings,
    state: Mutex<State>,
    store: Store,
    queue: OnceLock<crate::proto::WriteQueue>,
    state_tx: watch::Sender<TransportState>,
    pings: Mutex<Pings>,
}

impl Core {
    pub fn new(
        authority: String,
        settings: Settings,
        next_stream_id: StreamId,
        io: Io,
    ) -> Arc<Core> {
        assert!(
            next_stream_id.is_client_initiated(),
            "client stream ids must be odd"
        );

        let (state_tx, _) = watch::channel(TransportState::New);

        Arc::new(Core {
            authority,
            settings,
            state: Mutex::new(State {
                phase: Phase::New,
                next_stream_id,
                go_away: false,
                go_away_status: None,
                stopped: false,
                failed: false,
                io: Some(io),
            }),
            store: Store::new(),
            queue: OnceLock::new(),
            state_tx,
            pings: Mutex::new(Pings {
                next: 1,
                outstanding: HashMap::new(),
            }),
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.state_tx.subscribe()
    }

    pub fn max_data_len(&self) -> usize {
        self.queue
            .get()
            .map(|q| q.max_data_len())
            .unwrap_or(DEFAULT_MAX_DATA_LEN)
    }

    // ===== lifecycle =====

    /// Brings the transport up: dials (endpoint mode), sends the preface
    /// and initial SETTINGS, then starts the writer and dispatcher tasks.
    pub async fn start(self: &Arc<Self>) -> Result<(), Status> {
        let io = {
            let mut state = self.state.lock().unwrap();

            if state.phase != Phase::New {
                return Err(Status::internal("Transport already started"));
            }

            // The io slot doubles as the start latch for racing callers.
            match state.io.take() {
                Some(io) => io,
                None => return Err(Status::internal("Transport already started")),
            }
        };

        let (reader, writer, send_preface) = match io {
            Io::Endpoint { addr, codec } => {
                debug!("dialing {}", addr);

                let tcp = match TcpStream::connect(addr).await {
                    Ok(tcp) => tcp,
                    Err(err) => return Err(self.fail_start(Status::from_io_error(&err))),
                };

                let (reader, writer) = codec.split(tcp);
                (reader, writer, true)
            }
            Io::Parts { reader, writer } => (reader, writer, false),
        };

        let mut writer = writer;

        if send_preface {
            if let Err(err) = writer.connection_preface().await {
                return Err(self.fail_start(Status::from_io_error(&err)));
            }
        }

        let weak = Arc::downgrade(self);
        let queue = crate::proto::WriteQueue::spawn(writer, move |status| {
            if let Some(core) = weak.upgrade() {
                core.abort(status);
            }
        });

        self.queue.set(queue).ok().expect("transport started twice");

        if send_preface {
            self.enqueue(self.settings.clone());
            self.enqueue_flush();
        }

        {
            let mut state = self.state.lock().unwrap();
            state.phase = Phase::Running;
        }
        self.state_tx.send_replace(TransportState::Running);

        debug!("transport running; authority={}", self.authority);

        tokio::spawn(dispatch(self.clone(), reader));

        Ok(())
    }

    fn fail_start(&self, status: Status) -> Status {
        {
            let mut state = self.state.lock().unwrap();
            state.phase = Phase::Failed;
            state.failed = true;
            state.stopped = true;
            state.go_away = true;
            state.go_away_status = Some(status.clone());
        }
        self.state_tx
            .send_replace(TransportState::Failed(status.clone()));

        status
    }

    /// Graceful shutdown: advertise GOAWAY once, refuse new streams, let
    /// the existing ones drain. Idempotent.
    pub fn stop(&self) {
        let send_go_away = {
            let mut state = self.state.lock().unwrap();

            if state.stopped {
                false
            } else {
                if matches!(state.phase, Phase::New | Phase::Running) {
                    state.phase = Phase::Stopping;
                    self.state_tx.send_replace(TransportState::Stopping);
                }

                if !state.go_away {
                    state.go_away = true;
                    state.go_away_status = Some(Status::internal("Transport stopped"));
                    true
                } else {
                    false
                }
            }
        };

        if send_go_away {
            debug!("graceful stop; sending GOAWAY");
            self.enqueue(GoAway::new(StreamId::ZERO, ErrorCode::NO_ERROR));
            self.enqueue_flush();
        }

        self.maybe_stop();
    }

    /// Abortive shutdown: every active stream fails with `status`, the
    /// failure is published, and the connection is torn down.
    pub fn abort(&self, status: Status) {
        {
            let mut state = self.state.lock().unwrap();

            if state.stopped || state.failed {
                return;
            }

            state.failed = true;
            state.phase = Phase::Failed;
        }

        warn!("transport aborted; status={}", status);
        self.state_tx
            .send_replace(TransportState::Failed(status.clone()));

        self.enter_go_away(status, StreamId::ZERO);
    }

    /// Enters GOAWAY mode (idempotent for the status) and fails every
    /// stream above `last_known_id`. Each failed stream is removed from the
    /// store and sees the status exactly once.
    fn enter_go_away(&self, status: Status, last_known_id: StreamId) {
        let aborted = {
            let mut state = self.state.lock().unwrap();

            if !state.go_away {
                state.go_away = true;
                state.go_away_status = Some(status.clone());
            }

            // Transport lock is held: the snapshot cannot race id
            // assignment.
            self.store.drain_above(last_known_id)
        };

        for (id, stream) in aborted {
            debug!("failing stream {:?}; status={}", id, status);
            stream.finish(status.clone(), HeaderMap::new());
        }

        self.maybe_stop();
    }

    /// Quiescence check: once GOAWAY is set and no stream remains, the
    /// transport reaches its terminal state exactly once.
    pub fn maybe_stop(&self) {
        let terminal = {
            let mut state = self.state.lock().unwrap();

            if state.go_away && !state.stopped && self.store.is_empty() {
                state.stopped = true;

                if !state.failed {
                    state.phase = Phase::Stopped;
                }

                Some((
                    state.failed,
                    state
                        .go_away_status
                        .clone()
                        .unwrap_or_else(|| Status::unavailable("Transport stopped")),
                ))
            } else {
                None
            }
        };

        let Some((failed, status)) = terminal else {
            return;
        };

        debug!("transport terminal; failed={}", failed);

        if let Some(queue) = self.queue.get() {
            // Drains everything already queued, then releases the writer.
            let _ = queue.shutdown();
        }

        self.fail_pings(status);

        if !failed {
            self.state_tx.send_replace(TransportState::Stopped);
        }
    }

    // ===== streams =====

    /// Creates a stream for one call. Under the transport lock the stream
    /// either gets the next odd id and a HEADERS frame is queued, or — when
    /// GOAWAY has been entered — it is born finished with the GOAWAY
    /// status and never touches the wire.
    pub fn new_stream(
        self: &Arc<Self>,
        method: &str,
        metadata: HeaderMap,
        listener: Box<dyn StreamListener>,
        deframer: Box<dyn Deframer>,
    ) -> Stream {
        use crate::proto::write_queue::PushError;

        let inner = StreamInner::spawn(listener, deframer);
        let mut overflow = false;

        let opened = {
            let mut state = self.state.lock().unwrap();

            if state.go_away || state.phase != Phase::Running {
                let status = state
                    .go_away_status
                    .clone()
                    .unwrap_or_else(|| Status::internal("Transport not started"));
                drop(state);

                trace!("refusing new stream; status={}", status);
                inner.finish(status, HeaderMap::new());
                false
            } else {
                let id = state.next_stream_id;
                inner.assign_id(id);
                self.store.insert(id, inner.clone());
                state.next_stream_id = id.next_client_id();

                // The id just handed out stays valid; only future streams
                // are refused.
                if state.next_stream_id.as_u32() >= StreamId::MAX.as_u32() - 2 {
                    warn!("stream ids exhausted");
                    state.go_away = true;
                    state
                        .go_away_status
                        .get_or_insert(Status::internal("Stream id exhaust"));
                }

                trace!("opening stream {:?}; method={}", id, method);

                // HEADERS must reach the queue in id order, so the push
                // happens under the transport lock; the overflow abort is
                // deferred until the lock is released.
                let frame = Headers::new(
                    id,
                    HeaderBlock::request(method, &self.authority, metadata),
                );

                if let Some(queue) = self.queue.get() {
                    overflow = matches!(queue.push(frame), Err(PushError::Overflow));
                }

                true
            }
        };

        if overflow {
            self.abort(Status::internal("Write queue overflow"));
        } else if opened {
            self.enqueue_flush();
        }

        Stream::new(self.clone(), inner)
    }

    // ===== ping =====

    /// Sends a PING and resolves when the matching ack arrives.
    pub fn ping(&self) -> oneshot::Receiver<Result<(), Status>> {
        let (tx, rx) = oneshot::channel();

        {
            let state = self.state.lock().unwrap();
            if state.go_away || state.stopped {
                let status = state
                    .go_away_status
                    .clone()
                    .unwrap_or_else(|| Status::unavailable("Transport stopped"));
                let _ = tx.send(Err(status));
                return rx;
            }
        }

        let payload = {
            let mut pings = self.pings.lock().unwrap();
            let id = pings.next;
            pings.next += 1;
            pings.outstanding.insert(id, tx);
            id.to_be_bytes()
        };

        self.enqueue(Ping::ping(payload));
        self.enqueue_flush();

        // Termination may have raced the registration; a ping left in the
        // table after the terminal transition would never resolve.
        let raced = {
            let state = self.state.lock().unwrap();
            if state.stopped {
                state.go_away_status.clone()
            } else {
                None
            }
        };

        if let Some(status) = raced {
            self.fail_pings(status);
        }

        rx
    }

    fn complete_ping(&self, payload: PingPayload) {
        let id = u64::from_be_bytes(payload);

        if let Some(tx) = self.pings.lock().unwrap().outstanding.remove(&id) {
            let _ = tx.send(Ok(()));
        } else {
            debug!("PING ack with no outstanding ping; payload={}", id);
        }
    }

    fn fail_pings(&self, status: Status) {
        let outstanding = {
            let mut pings = self.pings.lock().unwrap();
            std::mem::take(&mut pings.outstanding)
        };

        for (_, tx) in outstanding {
            let _ = tx.send(Err(status.clone()));
        }
    }

    // ===== write path =====

    /// Submits a frame to the write serializer. Never blocks; an overflow
    /// means the writer cannot drain and the transport aborts.
    ///
    /// Callers must not hold a stream monitor: an overflow abort finishes
    /// every stream.
    pub fn enqueue(&self, frame: impl Into<Frame>) {
        let Some(queue) = self.queue.get() else {
            return;
        };

        use crate::proto::write_queue::PushError;

        match queue.push(frame) {
            Ok(()) => {}
            Err(PushError::Overflow) => {
                self.abort(Status::internal("Write queue overflow"));
            }
            Err(PushError::Closed) => {}
        }
    }

    pub fn enqueue_flush(&self) {
        if let Some(queue) = self.queue.get() {
            let _ = queue.flush();
        }
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().unwrap().stopped
    }

    // ===== inbound dispatch =====

    /// Applies one inbound frame. Runs on the dispatcher task only.
    fn handle_frame(&self, frame: Frame, conn_flow: &mut FlowControl) {
        match frame {
            Frame::Data(data) => self.recv_data(data, conn_flow),
            Frame::Headers(headers) => self.recv_headers(headers),
            Frame::Reset(reset) => self.recv_reset(reset),
            Frame::Settings(settings) => self.recv_settings(settings),
            Frame::Ping(ping) => self.recv_ping(ping),
            Frame::GoAway(go_away) => self.recv_go_away(go_away),
            Frame::PushPromise(push) => {
                // Pushes are refused outright; the SETTINGS sent at start
                // disable them, a peer ignoring that gets the stream reset.
                debug!("refusing PUSH_PROMISE; promised={:?}", push.promised_id());
                self.enqueue(Reset::new(push.promised_id(), ErrorCode::PROTOCOL_ERROR));
                self.enqueue_flush();
            }
            Frame::WindowUpdate(v) => {
                // Outbound flow control is not enforced.
                trace!("ignoring WINDOW_UPDATE; frame={:?}", v);
            }
            Frame::Priority(id) => trace!("ignoring PRIORITY; stream={:?}", id),
            Frame::AltSvc(id) => trace!("ignoring ALTSVC; stream={:?}", id),
        }
    }

    fn recv_data(&self, data: frame::Data, conn_flow: &mut FlowControl) {
        trace!("recv DATA; frame={:?}", data);

        let id = data.stream_id();
        let end_stream = data.is_end_stream();
        let len = data.len() as u32;
        let payload = data.into_payload();

        match self.store.get(id) {
            None => {
                debug!("DATA for unknown stream {:?}", id);
                self.enqueue(Reset::new(id, ErrorCode::INVALID_STREAM));
                self.enqueue_flush();
            }
            Some(stream) => {
                let (outcome, window_update) = stream.deliver_data(payload, end_stream);

                if let Some(delta) = window_update {
                    self.enqueue(WindowUpdate::new(id, delta));
                    self.enqueue_flush();
                }

                self.finish_delivery(id, outcome);
            }
        }

        // Dropped payloads still consume connection window.
        if let Some(delta) = conn_flow.recv(len) {
            self.enqueue(WindowUpdate::new(StreamId::ZERO, delta));
            self.enqueue_flush();
        }
    }

    fn recv_headers(&self, headers: frame::Headers) {
        trace!("recv HEADERS; frame={:?}", headers);

        let id = headers.stream_id();
        let end_stream = headers.is_end_stream();

        match self.store.get(id) {
            None => {
                debug!("HEADERS for unknown stream {:?}", id);
                self.enqueue(Reset::new(id, ErrorCode::INVALID_STREAM));
                self.enqueue_flush();
            }
            Some(stream) => {
                let fields = headers.into_block().into_fields();
                let outcome = stream.deliver_headers(fields, end_stream);
                self.finish_delivery(id, outcome);
            }
        }
    }

    fn finish_delivery(&self, id: StreamId, outcome: Deliver) {
        match outcome {
            Deliver::Open => {}
            Deliver::EndOfStream => {
                self.store.remove(id);
                self.maybe_stop();
            }
            Deliver::Failed => {
                self.store.remove(id);
                self.enqueue(Reset::new(id, ErrorCode::CANCEL));
                self.enqueue_flush();
                self.maybe_stop();
            }
        }
    }

    fn recv_reset(&self, reset: frame::Reset) {
        debug!("recv RST_STREAM; frame={:?}", reset);

        if let Some(stream) = self.store.remove(reset.stream_id()) {
            let status = Status::from_http2_error(reset.error_code());
            stream.finish(status, HeaderMap::new());
            self.maybe_stop();
        }
    }

    fn recv_settings(&self, settings: frame::Settings) {
        trace!("recv SETTINGS; frame={:?}", settings);

        if settings.is_ack() {
            return;
        }

        // The payload is acknowledged but not otherwise applied; see the
        // crate docs for the INITIAL_WINDOW_SIZE gap.
        self.enqueue(Settings::ack());
        self.enqueue_flush();
    }

    fn recv_ping(&self, ping: frame::Ping) {
        trace!("recv PING; frame={:?}", ping);

        if ping.is_ack() {
            self.complete_ping(ping.into_payload());
        } else {
            self.enqueue(Ping::pong(ping.into_payload()));
            self.enqueue_flush();
        }
    }

    fn recv_go_away(&self, go_away: frame::GoAway) {
        debug!(
            "recv GOAWAY; last_stream_id={:?} code={}",
            go_away.last_stream_id(),
            go_away.error_code()
        );

        {
            let mut state = self.state.lock().unwrap();
            if state.phase == Phase::Running {
                state.phase = Phase::Stopping;
                self.state_tx.send_replace(TransportState::Stopping);
            }
        }

        self.enter_go_away(
            Status::unavailable("Go away"),
            go_away.last_stream_id(),
        );
    }
}

/// The inbound dispatcher: the only task reading the socket. Pulls frames
/// until EOF or error and applies the per-frame handlers in arrival order.
async fn dispatch(core: Arc<Core>, mut reader: Box<dyn FrameReader>) {
    let mut conn_flow = FlowControl::new();

    loop {
        match reader.next().await {
            Ok(Some(frame)) => core.handle_frame(frame, &mut conn_flow),
            Ok(None) => {
                debug!("reader closed");
                if !core.is_stopped() {
                    core.abort(Status::unavailable("End of stream"));
                }
                return;
            }
            Err(err) => {
                debug!("reader failed; err={:?}", err);
                core.abort(Status::from_io_error(&err));
                return;
            }
        }
    }
}
