use crate::frame::Frame;

/// An 8-octet opaque ping payload.
pub type Payload = [u8; 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    ack: bool,
    payload: Payload,
}

impl Ping {
    pub fn ping(payload: Payload) -> Ping {
        Ping {
            ack: false,
            payload,
        }
    }

    /// > Receivers of a PING frame that does not include an ACK flag MUST
    /// > send a PING frame with the ACK flag set in response, with an
    /// > identical payload.
    pub fn pong(payload: Payload) -> Ping {
        Ping { ack: true, payload }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

impl From<Ping> for Frame {
    fn from(src: Ping) -> Frame {
        Frame::Ping(src)
    }
}
