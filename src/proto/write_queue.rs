//! The write serializer.
//!
//! HTTP/2 framing requires strictly serialized writes per connection. Many
//! callers (application handles, the inbound dispatcher, the lifecycle) fan
//! in to one bounded queue drained by a single task that exclusively owns
//! the codec writer, so no caller ever blocks on the socket and the frame
//! handlers stay callable from the read loop.

use log::{debug, trace};
use tokio::sync::mpsc;

use crate::codec::FrameWriter;
use crate::frame::Frame;
use crate::status::Status;

/// Commands accepted by the writer task, applied in FIFO order.
#[derive(Debug)]
enum Command {
    Frame(Frame),
    Flush,
    /// Drain everything queued ahead, then release the writer.
    Shutdown,
}

/// Queue depth. Filling up means the socket (or the peer) stopped draining;
/// overflowing submissions abort the transport rather than buffer without
/// bound.
const CAPACITY: usize = 1024;

/// Error returned when a command cannot be enqueued.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushError {
    /// The queue is full.
    Overflow,
    /// The writer task is gone; the transport is shutting down.
    Closed,
}

/// Handle for submitting frame writes. Cheap to clone.
#[derive(Clone)]
pub(crate) struct WriteQueue {
    tx: mpsc::Sender<Command>,
    max_data_len: usize,
}

impl WriteQueue {
    /// Takes ownership of the writer and starts the drain task. `on_error`
    /// fires at most once, with the classified status of a write failure.
    pub fn spawn<F>(writer: Box<dyn FrameWriter>, on_error: F) -> WriteQueue
    where
        F: FnOnce(Status) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CAPACITY);
        let max_data_len = writer.max_data_len();

        tokio::spawn(drain(writer, rx, on_error));

        WriteQueue { tx, max_data_len }
    }

    /// The largest DATA payload the codec accepts in one frame.
    pub fn max_data_len(&self) -> usize {
        self.max_data_len
    }

    pub fn push(&self, frame: impl Into<Frame>) -> Result<(), PushError> {
        self.send(Command::Frame(frame.into()))
    }

    pub fn flush(&self) -> Result<(), PushError> {
        self.send(Command::Flush)
    }

    /// Requests drain-then-close. Idempotent; later submissions fail with
    /// `Closed`.
    pub fn shutdown(&self) -> Result<(), PushError> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<(), PushError> {
        trace!("write queue send; command={:?}", command);

        self.tx.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PushError::Overflow,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }
}

async fn drain<F>(
    mut writer: Box<dyn FrameWriter>,
    mut rx: mpsc::Receiver<Command>,
    on_error: F,
) where
    F: FnOnce(Status) + Send + 'static,
{
    let mut on_error = Some(on_error);

    while let Some(command) = rx.recv().await {
        let res = match command {
            Command::Frame(frame) => writer.write(frame).await,
            Command::Flush => writer.flush().await,
            Command::Shutdown => {
                debug!("write queue shutting down");
                // Everything submitted before the shutdown request has
                // already been applied; release the writer.
                let _ = writer.shutdown().await;
                return;
            }
        };

        if let Err(err) = res {
            debug!("write failed; err={:?}", err);
            rx.close();

            if let Some(f) = on_error.take() {
                f(Status::from_io_error(&err));
            }

            return;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::{Ping, Reset, StreamId};

    use std::io;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    /// A stubbed codec writer recording everything applied to it.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Inner>>);

    #[derive(Default)]
    struct Inner {
        frames: Vec<Frame>,
        flushes: usize,
        shutdown: bool,
        fail_writes: bool,
    }

    #[async_trait]
    impl FrameWriter for Recorder {
        async fn connection_preface(&mut self) -> io::Result<()> {
            Ok(())
        }

        async fn write(&mut self, frame: Frame) -> io::Result<()> {
            let mut inner = self.0.lock().unwrap();
            if inner.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "boom"));
            }
            inner.frames.push(frame);
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            self.0.lock().unwrap().flushes += 1;
            Ok(())
        }

        async fn shutdown(&mut self) -> io::Result<()> {
            self.0.lock().unwrap().shutdown = true;
            Ok(())
        }

        fn max_data_len(&self) -> usize {
            16_384
        }
    }

    #[tokio::test]
    async fn applies_commands_in_submission_order() {
        let recorder = Recorder::default();
        let queue = WriteQueue::spawn(Box::new(recorder.clone()), |_| panic!("write failed"));

        queue.push(Ping::ping(*b"12345678")).unwrap();
        queue
            .push(Reset::new(StreamId::new(3), crate::frame::ErrorCode::CANCEL))
            .unwrap();
        queue.flush().unwrap();
        queue.shutdown().unwrap();

        // Wait for the drain task to observe the shutdown.
        while !recorder.0.lock().unwrap().shutdown {
            tokio::task::yield_now().await;
        }

        let inner = recorder.0.lock().unwrap();
        assert_eq!(inner.frames.len(), 2);
        assert!(matches!(inner.frames[0], Frame::Ping(..)));
        assert!(matches!(inner.frames[1], Frame::Reset(..)));
        assert_eq!(inner.flushes, 1);
    }

    #[tokio::test]
    async fn write_failure_reports_status_once() {
        let recorder = Recorder::default();
        recorder.0.lock().unwrap().fail_writes = true;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let queue = WriteQueue::spawn(Box::new(recorder.clone()), move |status| {
            tx.send(status).unwrap();
        });

        queue.push(Ping::ping([0; 8])).unwrap();

        let status = rx.await.unwrap();
        assert_eq!(status.code(), crate::status::Code::Unavailable);

        // The queue stops accepting writes.
        while queue.push(Ping::ping([0; 8])).is_ok() {
            tokio::task::yield_now().await;
        }
    }
}
