//! A client-side RPC transport core over HTTP/2.
//!
//! This crate multiplexes many concurrent logical calls onto a single
//! HTTP/2 connection. Each call gets an ordered, flow-controlled,
//! cancellable message channel; the transport owns the socket and the
//! lifecycle of every stream on it.
//!
//! # Architecture
//!
//! One [`Transport`] owns one connection. Three task roles cooperate:
//!
//! * The **inbound dispatcher** is the only task reading the socket. It
//!   pulls typed frames from the [`codec::FrameReader`] and applies the
//!   per-frame handlers in arrival order.
//! * The **write serializer** is the only task writing the socket. Frame
//!   submissions from any caller fan in to a bounded queue drained in FIFO
//!   order, so submission order is wire order and no caller blocks on I/O.
//! * **Per-stream listener tasks** deliver headers, messages and the
//!   terminal status to the application. Events for one stream flow
//!   through one queue with one consumer, so callbacks are totally ordered
//!   and never concurrent.
//!
//! The byte-level HTTP/2 codec (HPACK and frame encoding) is not part of
//! this crate; it plugs in behind the [`codec`] traits. The
//! [`Builder::from_parts`] constructor accepts preassembled codec halves,
//! which is also the seam the tests drive the transport through.
//!
//! # Streams
//!
//! [`Transport::new_stream`] assigns the next odd stream id, queues the
//! request HEADERS and returns a [`Stream`] handle. The registered
//! [`StreamListener`] observes headers before any message, messages in
//! wire order, and exactly one terminal [`Status`] after which no further
//! callback runs. [`Stream::cancel`] resets the call; a peer RST_STREAM,
//! GOAWAY or transport failure likewise finishes it with the mapped
//! status.
//!
//! # Flow control
//!
//! Receive-side flow control is handled internally: once half the default
//! window of unacknowledged bytes accumulates on a stream or on the
//! connection, the accumulated credit is returned in one WINDOW_UPDATE.
//! [`Stream::pause_window_updates`] defers the per-stream share while the
//! application applies backpressure. Outbound flow control is not
//! enforced: the peer's advertised windows (and INITIAL_WINDOW_SIZE
//! settings changes) are acknowledged but not applied, a deliberate gap.
//!
//! # Lifecycle
//!
//! A transport moves through `New → Running → Stopping → Stopped`, or to
//! `Failed` on abort; transitions are observable through
//! [`Transport::state`]. Graceful [`Transport::stop`] advertises GOAWAY,
//! refuses new streams and lets active calls drain. A peer GOAWAY fails
//! the streams above its last-good id with UNAVAILABLE and drains the
//! rest.

pub mod codec;
pub mod deframe;
pub mod frame;

mod proto;
mod status;
mod transport;

pub use crate::proto::connection::TransportState;
pub use crate::proto::streams::{Stream, StreamListener, WindowUpdatePause};
pub use crate::status::{Code, Status};
pub use crate::transport::{Builder, Transport};
