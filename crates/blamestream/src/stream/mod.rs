//! Incremental result streaming.
//!
//! [`EventWriter`] sends events into an SSE response, [`StatHook`] observes every
//! write, and [`drive`] pulls hunks from a [`HunkReader`](crate::blame::HunkReader)
//! until it is exhausted or fails.

mod context;
mod driver;
mod stat;
mod writer;

pub use context::{ContextError, StreamContext};
pub use driver::{StreamOutcome, drive};
pub use stat::{NoopHook, StatHook, WriterStat};
pub use writer::{
    ChannelSink, EventBody, EventWriter, FrameSink, StreamAborted, WriterError, event_channel,
    html_escape,
};
