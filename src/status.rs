//! The logical status taxonomy streams terminate with.

use std::borrow::Cow;
use std::fmt;
use std::io;

use crate::frame::ErrorCode;

/// The terminal outcome of a stream or transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: Cow<'static, str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The stream ended normally.
    Ok,
    /// Locally cancelled, or the peer reset the stream with CANCEL.
    Cancelled,
    /// The peer went away; the stream was above the last good stream id.
    Unavailable,
    /// The peer reset the stream with INVALID_CREDENTIALS.
    PermissionDenied,
    /// Protocol violations, unknown error codes, stream-id exhaustion and
    /// unclassified failures.
    Internal,
    Unknown,
}

impl Status {
    pub fn new(code: Code, message: impl Into<Cow<'static, str>>) -> Status {
        Status {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Status {
        Status::new(Code::Ok, "")
    }

    pub fn cancelled(message: impl Into<Cow<'static, str>>) -> Status {
        Status::new(Code::Cancelled, message)
    }

    pub fn unavailable(message: impl Into<Cow<'static, str>>) -> Status {
        Status::new(Code::Unavailable, message)
    }

    pub fn permission_denied(message: impl Into<Cow<'static, str>>) -> Status {
        Status::new(Code::PermissionDenied, message)
    }

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Status {
        Status::new(Code::Internal, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Maps a peer-visible HTTP/2 error code to a status.
    pub fn from_http2_error(code: ErrorCode) -> Status {
        match code {
            ErrorCode::NO_ERROR => Status::ok(),
            ErrorCode::CANCEL => Status::cancelled("Cancelled"),
            ErrorCode::INVALID_CREDENTIALS => {
                Status::permission_denied("Invalid credentials")
            }
            _ => match code.description() {
                Some(name) => Status::internal(name),
                None => Status::internal("Unknown http2 error code"),
            },
        }
    }

    /// Classifies an I/O error. Connection-shaped failures map to
    /// UNAVAILABLE; anything else is INTERNAL.
    pub fn from_io_error(err: &io::Error) -> Status {
        use io::ErrorKind::*;

        let code = match err.kind() {
            ConnectionReset | ConnectionAborted | ConnectionRefused | BrokenPipe
            | NotConnected | UnexpectedEof | TimedOut => Code::Unavailable,
            _ => Code::Internal,
        };

        Status::new(code, err.to_string())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            write!(fmt, "{:?}", self.code)
        } else {
            write!(fmt, "{:?}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for Status {}
