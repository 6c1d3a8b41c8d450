//! Userspace half of the netevent bridge: the bounded in-process event
//! channel, the record envelope handed to output sinks, and the sink trait.

pub mod channel;
pub mod error;
pub mod record;
pub mod sink;

pub use channel::{ChannelStats, Drain, EventChannel, DEFAULT_CAPACITY};
pub use error::ChannelError;
pub use record::EventRecord;
pub use sink::EventSink;
