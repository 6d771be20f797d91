//! Public transport surface.

use std::net::SocketAddr;
use std::sync::Arc;

use http::HeaderMap;
use tokio::sync::watch;

use crate::codec::{Codec, FrameReader, FrameWriter};
use crate::deframe::{Deframer, LengthPrefixedDeframer};
use crate::frame::{Settings, StreamId};
use crate::proto::connection::{Core, Io, TransportState};
use crate::proto::streams::{Stream, StreamListener};
use crate::status::Status;

/// Configures a [`Transport`] before it is bound.
#[derive(Debug)]
pub struct Builder {
    authority: String,
    settings: Settings,
    next_stream_id: StreamId,
}

impl Builder {
    /// `authority` is the value of the `:authority` pseudo header sent with
    /// every request.
    pub fn new(authority: impl Into<String>) -> Builder {
        let mut settings = Settings::default();
        // Pushed streams are refused; say so up front.
        settings.set_enable_push(false);

        Builder {
            authority: authority.into(),
            settings,
            next_stream_id: StreamId::new(3),
        }
    }

    /// Sets the initial stream window size advertised in the first
    /// SETTINGS frame.
    pub fn initial_window_size(mut self, size: u32) -> Builder {
        self.settings.set_initial_window_size(Some(size));
        self
    }

    /// Sets the max frame size advertised in the first SETTINGS frame.
    pub fn max_frame_size(mut self, size: u32) -> Builder {
        self.settings.set_max_frame_size(Some(size));
        self
    }

    /// Seeds the first client stream id. Mostly a test seam, e.g. for
    /// driving the id space to exhaustion.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not odd.
    pub fn initial_stream_id(mut self, id: u32) -> Builder {
        let id = StreamId::new(id);
        assert!(id.is_client_initiated(), "stream id must be odd");
        self.next_stream_id = id;
        self
    }

    /// Binds a transport that dials `addr` on `start` and frames the
    /// socket through `codec`.
    pub fn connect(self, addr: SocketAddr, codec: impl Codec) -> Transport {
        Transport {
            core: Core::new(
                self.authority,
                self.settings,
                self.next_stream_id,
                Io::Endpoint {
                    addr,
                    codec: Box::new(codec),
                },
            ),
        }
    }

    /// Binds a transport over preconstructed codec halves. `start` skips
    /// dialing and the connection preface.
    pub fn from_parts(
        self,
        reader: impl FrameReader,
        writer: impl FrameWriter,
    ) -> Transport {
        Transport {
            core: Core::new(
                self.authority,
                self.settings,
                self.next_stream_id,
                Io::Parts {
                    reader: Box::new(reader),
                    writer: Box::new(writer),
                },
            ),
        }
    }
}

/// A client transport: one HTTP/2 connection multiplexing many concurrent
/// calls.
///
/// Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct Transport {
    core: Arc<Core>,
}

impl Transport {
    pub fn builder(authority: impl Into<String>) -> Builder {
        Builder::new(authority)
    }

    /// Brings the transport to `Running`: dials the peer (endpoint mode),
    /// sends the connection preface and initial SETTINGS, and starts the
    /// reader and writer tasks.
    pub async fn start(&self) -> Result<(), Status> {
        self.core.start().await
    }

    /// Graceful shutdown: no new streams are admitted, active calls drain,
    /// and the transport reaches `Stopped` once the last one ends.
    /// Idempotent.
    pub fn stop(&self) {
        self.core.stop();
    }

    /// Abortive shutdown: every active call fails with `status`.
    pub fn abort(&self, status: Status) {
        self.core.abort(status);
    }

    /// Subscribes to lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<TransportState> {
        self.core.subscribe()
    }

    /// The `:authority` this transport targets.
    pub fn authority(&self) -> &str {
        self.core.authority()
    }

    /// Round-trips a PING through the peer.
    pub async fn ping(&self) -> Result<(), Status> {
        match self.core.ping().await {
            Ok(res) => res,
            Err(_) => Err(Status::unavailable("Transport terminated")),
        }
    }

    /// Opens a stream for the call `method`, delivering inbound events to
    /// `listener`. Messages are recovered with the standard length-prefixed
    /// framing.
    pub fn new_stream(
        &self,
        method: &str,
        metadata: HeaderMap,
        listener: impl StreamListener,
    ) -> Stream {
        self.new_stream_with_deframer(
            method,
            metadata,
            listener,
            LengthPrefixedDeframer::new(),
        )
    }

    /// Like [`new_stream`](Transport::new_stream) with a caller-supplied
    /// message framing.
    pub fn new_stream_with_deframer(
        &self,
        method: &str,
        metadata: HeaderMap,
        listener: impl StreamListener,
        deframer: impl Deframer,
    ) -> Stream {
        self.core
            .new_stream(method, metadata, Box::new(listener), Box::new(deframer))
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("Transport")
            .field("authority", &self.authority())
            .finish()
    }
}
