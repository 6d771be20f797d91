use crate::frame::{ErrorCode, Frame, StreamId};

/// RST_STREAM frame: abortive termination of a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reset {
    stream_id: StreamId,
    error_code: ErrorCode,
}

impl Reset {
    pub fn new(stream_id: StreamId, error_code: ErrorCode) -> Reset {
        Reset {
            stream_id,
            error_code,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }
}

impl From<Reset> for Frame {
    fn from(src: Reset) -> Frame {
        Frame::Reset(src)
    }
}
