//! Wire types for the blamestream hunk stream.
//!
//! The server emits Server-Sent-Events frames: any number of `hunk` frames, each
//! carrying one [`Hunk`], terminated by exactly one `done` frame with an empty JSON
//! object. A connection that closes without a `done` frame has failed.

pub mod frame;
pub mod hunk;

pub use frame::{EVENT_DONE, EVENT_HUNK, Frame, FrameError, decode_frames};
pub use hunk::{Author, Hunk};
