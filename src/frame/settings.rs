use crate::frame::Frame;

/// SETTINGS frame: connection-level configuration parameters.
///
/// Every SETTINGS frame received from the peer must be acknowledged; an
/// acknowledgment carries the `ack` flag and no parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    ack: bool,
    initial_window_size: Option<u32>,
    max_frame_size: Option<u32>,
    max_concurrent_streams: Option<u32>,
    enable_push: Option<bool>,
}

impl Settings {
    pub fn ack() -> Settings {
        Settings {
            ack: true,
            ..Settings::default()
        }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn initial_window_size(&self) -> Option<u32> {
        self.initial_window_size
    }

    pub fn set_initial_window_size(&mut self, size: Option<u32>) {
        self.initial_window_size = size;
    }

    pub fn max_frame_size(&self) -> Option<u32> {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, size: Option<u32>) {
        self.max_frame_size = size;
    }

    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    pub fn set_max_concurrent_streams(&mut self, max: Option<u32>) {
        self.max_concurrent_streams = max;
    }

    pub fn is_push_enabled(&self) -> Option<bool> {
        self.enable_push
    }

    pub fn set_enable_push(&mut self, enable: bool) {
        self.enable_push = Some(enable);
    }
}

impl From<Settings> for Frame {
    fn from(src: Settings) -> Frame {
        Frame::Settings(src)
    }
}
