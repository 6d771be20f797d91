use bytes::Bytes;

use crate::frame::{Frame, StreamId};

/// Data frame
///
/// Data frames convey arbitrary, variable-length sequences of octets
/// associated with a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    stream_id: StreamId,
    payload: Bytes,
    end_stream: bool,
}

impl Data {
    pub fn new(stream_id: StreamId, payload: Bytes) -> Self {
        Data {
            stream_id,
            payload,
            end_stream: false,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    pub fn set_end_stream(&mut self, val: bool) {
        self.end_stream = val;
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl From<Data> for Frame {
    fn from(src: Data) -> Frame {
        Frame::Data(src)
    }
}
