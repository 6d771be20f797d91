use std::fmt;

/// An HTTP/2 error code, carried by RST_STREAM and GOAWAY frames.
///
/// Error codes are 32-bit values; codes this endpoint does not recognize
/// still round-trip through the [`ErrorCode`] value unchanged.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ErrorCode(u32);

impl ErrorCode {
    /// The associated condition is not a result of an error.
    pub const NO_ERROR: ErrorCode = ErrorCode(0x0);

    /// The endpoint detected an unspecific protocol error.
    pub const PROTOCOL_ERROR: ErrorCode = ErrorCode(0x1);

    /// The endpoint encountered an unexpected internal error.
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode(0x2);

    /// The endpoint detected that its peer violated the flow-control protocol.
    pub const FLOW_CONTROL_ERROR: ErrorCode = ErrorCode(0x3);

    /// The endpoint sent a SETTINGS frame but did not receive a response in
    /// a timely manner.
    pub const SETTINGS_TIMEOUT: ErrorCode = ErrorCode(0x4);

    /// The endpoint received a frame after a stream was half-closed.
    pub const STREAM_CLOSED: ErrorCode = ErrorCode(0x5);

    /// Sent on frames addressed to a stream this endpoint has no record of.
    /// Shares STREAM_CLOSED's wire value; kept as a distinct name because the
    /// transport refuses unknown streams with it.
    pub const INVALID_STREAM: ErrorCode = ErrorCode(0x5);

    /// The endpoint received a frame with an invalid size.
    pub const FRAME_SIZE_ERROR: ErrorCode = ErrorCode(0x6);

    /// The endpoint refused the stream prior to performing any application
    /// processing.
    pub const REFUSED_STREAM: ErrorCode = ErrorCode(0x7);

    /// Used by the endpoint to indicate that the stream is no longer needed.
    pub const CANCEL: ErrorCode = ErrorCode(0x8);

    /// The endpoint is unable to maintain the header compression context for
    /// the connection.
    pub const COMPRESSION_ERROR: ErrorCode = ErrorCode(0x9);

    /// The connection established in response to a CONNECT request was reset
    /// or abnormally closed.
    pub const CONNECT_ERROR: ErrorCode = ErrorCode(0xa);

    /// The endpoint detected that its peer is exhibiting a behavior that
    /// might be generating excessive load.
    pub const ENHANCE_YOUR_CALM: ErrorCode = ErrorCode(0xb);

    /// The underlying transport has properties that do not meet minimum
    /// security requirements.
    pub const INADEQUATE_SECURITY: ErrorCode = ErrorCode(0xc);

    /// The endpoint requires that HTTP/1.1 be used instead of HTTP/2.
    pub const HTTP_1_1_REQUIRED: ErrorCode = ErrorCode(0xd);

    /// The request credentials were invalid. A SPDY-era extension code some
    /// RPC peers still emit.
    pub const INVALID_CREDENTIALS: ErrorCode = ErrorCode(0xe);

    /// The human-readable name of the code, or `None` if unrecognized.
    pub fn description(&self) -> Option<&'static str> {
        match self.0 {
            0x0 => Some("NO_ERROR"),
            0x1 => Some("PROTOCOL_ERROR"),
            0x2 => Some("INTERNAL_ERROR"),
            0x3 => Some("FLOW_CONTROL_ERROR"),
            0x4 => Some("SETTINGS_TIMEOUT"),
            0x5 => Some("STREAM_CLOSED"),
            0x6 => Some("FRAME_SIZE_ERROR"),
            0x7 => Some("REFUSED_STREAM"),
            0x8 => Some("CANCEL"),
            0x9 => Some("COMPRESSION_ERROR"),
            0xa => Some("CONNECT_ERROR"),
            0xb => Some("ENHANCE_YOUR_CALM"),
            0xc => Some("INADEQUATE_SECURITY"),
            0xd => Some("HTTP_1_1_REQUIRED"),
            0xe => Some("INVALID_CREDENTIALS"),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ErrorCode {
    fn from(src: u32) -> ErrorCode {
        ErrorCode(src)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.description() {
            Some(name) => fmt.write_str(name),
            None => write!(fmt, "unknown error code 0x{:x}", self.0),
        }
    }
}
