//! Message boundary recovery.
//!
//! A stream's inbound bytes arrive as arbitrarily split DATA payloads; a
//! [`Deframer`] reassembles them into application messages. The transport
//! feeds buffers in wire order and emits whatever the deframer produces
//! through the stream's event queue, so listener-visible ordering follows
//! the wire even when a message spans many frames.

use bytes::{Buf, Bytes, BytesMut};

use crate::status::Status;

/// Receives the messages a deframer emits.
pub trait MessageSink {
    fn message(&mut self, message: Bytes);
}

impl<F: FnMut(Bytes)> MessageSink for F {
    fn message(&mut self, message: Bytes) {
        self(message)
    }
}

/// Reassembles message-level records from a stream of byte buffers.
pub trait Deframer: Send + 'static {
    /// Consumes `data`, emitting any messages it completes.
    fn deframe(&mut self, data: Bytes, sink: &mut dyn MessageSink) -> Result<(), Status>;

    /// True while a partially received record is buffered. End of stream
    /// with a partial record is a broken peer.
    fn has_partial(&self) -> bool;
}

/// Record header: 1 compressed-flag octet + 4 length octets.
const PREFIX_LEN: usize = 5;

/// Default cap on a single reassembled message.
const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// The standard RPC record framing: each message is preceded by a
/// compressed-flag octet and a big-endian u32 length.
#[derive(Debug)]
pub struct LengthPrefixedDeframer {
    buf: BytesMut,
    max_message_size: usize,
}

impl LengthPrefixedDeframer {
    pub fn new() -> LengthPrefixedDeframer {
        LengthPrefixedDeframer {
            buf: BytesMut::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(max: usize) -> LengthPrefixedDeframer {
        LengthPrefixedDeframer {
            buf: BytesMut::new(),
            max_message_size: max,
        }
    }
}

impl Default for LengthPrefixedDeframer {
    fn default() -> Self {
        LengthPrefixedDeframer::new()
    }
}

impl Deframer for LengthPrefixedDeframer {
    fn deframe(&mut self, data: Bytes, sink: &mut dyn MessageSink) -> Result<(), Status> {
        self.buf.extend_from_slice(&data);

        loop {
            if self.buf.len() < PREFIX_LEN {
                return Ok(());
            }

            let compressed = self.buf[0] != 0;
            let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]])
                as usize;

            if compressed {
                return Err(Status::internal(
                    "Compressed message received without a decompressor",
                ));
            }

            if len > self.max_message_size {
                return Err(Status::internal(format!(
                    "Message of {} bytes exceeds limit of {}",
                    len, self.max_message_size
                )));
            }

            if self.buf.len() < PREFIX_LEN + len {
                return Ok(());
            }

            self.buf.advance(PREFIX_LEN);
            let message = self.buf.split_to(len).freeze();
            sink.message(message);
        }
    }

    fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

/// Frames one outbound message. The inverse of the deframer; callers use it
/// to build `send_message` payloads.
pub fn frame_message(message: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PREFIX_LEN + message.len());
    buf.extend_from_slice(&[0]);
    buf.extend_from_slice(&(message.len() as u32).to_be_bytes());
    buf.extend_from_slice(message);
    buf.freeze()
}
