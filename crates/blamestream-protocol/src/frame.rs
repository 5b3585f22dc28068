//! Server-Sent-Events framing.
//!
//! Each frame on the wire is
//!
//! ```text
//! event: <name>
//! data: <compact json>
//!
//! ```
//!
//! [`decode_frames`] turns a raw response body into [`Frame`]s for clients that
//! consume the stream chunk by chunk.

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Frame carrying one blame hunk.
pub const EVENT_HUNK: &str = "hunk";

/// Terminal frame. Carries `{}` and is always the last frame of a successful stream.
pub const EVENT_DONE: &str = "done";

/// Framing errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The body failed or could not be parsed as an event stream. After a
    /// server-side abort this is what a client sees instead of `done`.
    #[error("event stream failed: {0}")]
    Stream(String),
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    /// Deserialize the frame payload.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FrameError> {
        Ok(serde_json::from_str(&self.data)?)
    }

    pub fn is_done(&self) -> bool {
        self.event == EVENT_DONE
    }
}

/// Decode a chunked response body into frames.
///
/// Chunks may split lines and multi-byte characters anywhere. Comment lines are
/// skipped. A transport error ends the stream with [`FrameError::Stream`].
pub fn decode_frames<S, B, E>(body: S) -> impl Stream<Item = Result<Frame, FrameError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    body.eventsource().map(|item| {
        item.map(|event| Frame {
            event: event.event,
            data: event.data,
        })
        .map_err(|err| FrameError::Stream(err.to_string()))
    })
}
