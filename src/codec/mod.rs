//! The frame codec boundary.
//!
//! The transport does not parse or serialize HTTP/2 bytes itself; it talks
//! to a codec through these traits. The writer half is only ever driven by
//! the write queue's single task, so implementations may assume
//! single-threaded access. The reader half is owned by the inbound
//! dispatcher task.

use std::io;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::frame::Frame;

/// Serializes typed frames onto the connection.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// Writes the client connection preface. Called once, before any frame.
    async fn connection_preface(&mut self) -> io::Result<()>;

    /// Encodes and buffers one frame.
    async fn write(&mut self, frame: Frame) -> io::Result<()>;

    /// Flushes buffered frames to the socket.
    async fn flush(&mut self) -> io::Result<()>;

    /// Flushes and releases the underlying writer.
    async fn shutdown(&mut self) -> io::Result<()>;

    /// The largest DATA payload a single `write` accepts.
    fn max_data_len(&self) -> usize;
}

/// Parses inbound bytes into typed frames.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Reads the next frame. `Ok(None)` on clean EOF; `Err` on I/O failure.
    async fn next(&mut self) -> io::Result<Option<Frame>>;
}

/// Splits a connected socket into the two codec halves.
pub trait Codec: Send + 'static {
    fn split(
        self: Box<Self>,
        io: TcpStream,
    ) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>);
}
