pub(crate) mod connection;
pub(crate) mod streams;
pub(crate) mod write_queue;

pub(crate) use self::write_queue::WriteQueue;

pub(crate) type PingPayload = [u8; 8];

pub(crate) type WindowSize = u32;

// Constants
pub(crate) const DEFAULT_INITIAL_WINDOW_SIZE: WindowSize = 65_535;

/// Unacked-byte level at which a WINDOW_UPDATE is emitted, per stream and
/// per connection.
pub(crate) const WINDOW_UPDATE_THRESHOLD: WindowSize = DEFAULT_INITIAL_WINDOW_SIZE / 2;
