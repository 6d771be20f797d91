mod flow_control;
mod store;
mod stream;

pub(crate) use self::flow_control::FlowControl;
pub(crate) use self::store::Store;
pub(crate) use self::stream::{Deliver, StreamInner};

pub use self::stream::{Stream, StreamListener, WindowUpdatePause};
