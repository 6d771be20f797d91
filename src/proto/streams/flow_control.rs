use crate::proto::{WindowSize, WINDOW_UPDATE_THRESHOLD};

/// Receive-side flow control state.
///
/// Tracks bytes received but not yet acknowledged with a WINDOW_UPDATE.
/// Once the unacked total reaches half the default initial window the
/// pending delta is taken and the counter resets, so the peer's window is
/// restored in large steps rather than per-frame.
#[derive(Debug)]
pub struct FlowControl {
    /// Bytes received and not yet acknowledged.
    unacked: WindowSize,

    /// While set, window updates are deferred; the counter keeps growing.
    suppressed: bool,
}

impl FlowControl {
    pub fn new() -> FlowControl {
        FlowControl {
            unacked: 0,
            suppressed: false,
        }
    }

    /// Records `len` received bytes. Returns the WINDOW_UPDATE delta to
    /// emit, if the threshold was reached and updates are not suppressed.
    pub fn recv(&mut self, len: WindowSize) -> Option<WindowSize> {
        self.unacked += len;

        if !self.suppressed && self.unacked >= WINDOW_UPDATE_THRESHOLD {
            return Some(self.take());
        }

        None
    }

    /// Defers window updates until `release` is called.
    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    /// Re-enables window updates. Returns the pending delta if the
    /// threshold is already met.
    pub fn release(&mut self) -> Option<WindowSize> {
        self.suppressed = false;

        if self.unacked >= WINDOW_UPDATE_THRESHOLD {
            return Some(self.take());
        }

        None
    }

    pub fn unacked(&self) -> WindowSize {
        self.unacked
    }

    fn take(&mut self) -> WindowSize {
        let delta = self.unacked;
        self.unacked = 0;
        delta
    }
}
