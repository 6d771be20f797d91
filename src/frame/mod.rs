//! Typed HTTP/2 frame values.
//!
//! The byte-level codec (HPACK, frame parse/encode) lives outside this crate
//! behind the [`codec`](crate::codec) traits; everything here is the typed
//! representation that crosses that boundary.

mod data;
mod error_code;
mod go_away;
mod headers;
mod ping;
mod reset;
mod settings;
mod stream_id;
mod window_update;

pub use self::data::Data;
pub use self::error_code::ErrorCode;
pub use self::go_away::GoAway;
pub use self::headers::{HeaderBlock, Headers, PushPromise, Pseudo};
pub use self::ping::Ping;
pub use self::reset::Reset;
pub use self::settings::Settings;
pub use self::stream_id::StreamId;
pub use self::window_update::WindowUpdate;

/// A full frame, as delivered by the codec reader or handed to the codec
/// writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Data),
    Headers(Headers),
    Reset(Reset),
    Settings(Settings),
    Ping(Ping),
    GoAway(GoAway),
    WindowUpdate(WindowUpdate),
    PushPromise(PushPromise),
    /// Inbound-only; carries no state the transport acts on.
    Priority(StreamId),
    /// Inbound-only; alternate services are not handled.
    AltSvc(StreamId),
}

impl Frame {
    /// The stream the frame applies to; zero for connection-scoped frames.
    pub fn stream_id(&self) -> StreamId {
        use self::Frame::*;

        match *self {
            Data(ref v) => v.stream_id(),
            Headers(ref v) => v.stream_id(),
            Reset(ref v) => v.stream_id(),
            WindowUpdate(ref v) => v.stream_id(),
            PushPromise(ref v) => v.stream_id(),
            Priority(id) | AltSvc(id) => id,
            Settings(..) | Ping(..) | GoAway(..) => StreamId::ZERO,
        }
    }
}
