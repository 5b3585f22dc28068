//! Event frame writer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use blamestream_protocol::EVENT_DONE;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::context::StreamContext;
use super::stat::{StatHook, WriterStat};

/// Event name reported to the stat hook for the best-effort abort write.
const EVENT_ERROR: &str = "error";

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("response stream is closed")]
    SinkClosed,

    #[error("stream already finished")]
    Finished,

    #[error("invalid event name: {0:?}")]
    InvalidEventName(String),

    #[error("failed to serialize event payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Error that terminates a response body. Hyper closes the connection without the
/// chunked terminator when the body yields it.
#[derive(Debug, Clone, Error)]
#[error("stream aborted: {0}")]
pub struct StreamAborted(pub String);

/// SSE response fed by a [`ChannelSink`].
pub type EventBody = Sse<KeepAliveStream<ReceiverStream<Result<Event, StreamAborted>>>>;

/// Destination of SSE events.
#[async_trait]
pub trait FrameSink: Send {
    /// True once the receiving side is gone.
    fn is_closed(&self) -> bool;

    /// Deliver one event. Each event is flushed to the client as its own body frame.
    async fn send(&mut self, event: Event) -> Result<(), WriterError>;

    /// Write `trailer` if possible, then end the stream abnormally.
    async fn abort(&mut self, trailer: Event, reason: String);
}

/// Sink feeding an SSE response through a single-slot channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Event, StreamAborted>>,
}

/// Create a sink and the SSE response it feeds.
///
/// The channel holds one event, so the writer never runs more than one frame ahead
/// of the client. Keep-alive comments are interleaved while the producer is slow.
pub fn event_channel() -> (ChannelSink, EventBody) {
    let (tx, rx) = mpsc::channel(1);
    let body = Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default());
    (ChannelSink { tx }, body)
}

impl ChannelSink {
    /// Cancel `ctx` as soon as the response body is dropped (client disconnect).
    ///
    /// The watcher holds a sender until `ctx` is done, so the stream owner must cancel
    /// the context when it finishes or the body never ends.
    pub fn cancel_on_close(&self, ctx: &StreamContext) {
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => {
                    debug!("response body dropped, cancelling request");
                    ctx.cancel();
                }
                _ = ctx.done() => {}
            }
        });
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&mut self, event: Event) -> Result<(), WriterError> {
        self.tx
            .send(Ok(event))
            .await
            .map_err(|_| WriterError::SinkClosed)
    }

    async fn abort(&mut self, trailer: Event, reason: String) {
        if self.tx.send(Ok(trailer)).await.is_ok() {
            let _ = self.tx.send(Err(StreamAborted(reason))).await;
        }
    }
}

/// Writes named JSON events and reports every write to a [`StatHook`].
pub struct EventWriter<S: FrameSink = ChannelSink> {
    sink: S,
    hook: Arc<dyn StatHook>,
    last_write: Instant,
    frames: usize,
    finished: bool,
}

impl<S: FrameSink> EventWriter<S> {
    /// Open a writer over `sink`.
    ///
    /// Fails before anything is written when the sink can no longer stream.
    pub fn open(sink: S, hook: Arc<dyn StatHook>) -> Result<Self, WriterError> {
        if sink.is_closed() {
            return Err(WriterError::SinkClosed);
        }
        Ok(Self {
            sink,
            hook,
            last_write: Instant::now(),
            frames: 0,
            finished: false,
        })
    }

    /// Number of frames delivered so far. Non-zero means response headers and data
    /// are committed and errors can no longer become an HTTP status.
    pub fn frames_written(&self) -> usize {
        self.frames
    }

    /// Serialize `payload` and send it as one `name` event.
    pub async fn event<T>(&mut self, name: &str, payload: &T) -> Result<(), WriterError>
    where
        T: Serialize + ?Sized,
    {
        let result = self.write_event(name, payload).await;
        match &result {
            Ok(bytes) => self.observe(name, *bytes, None),
            Err(err) => self.observe(name, 0, Some(err.to_string())),
        }
        result.map(|_| ())
    }

    /// Send the terminal `done` event. No further events are accepted afterwards.
    pub async fn done(&mut self) -> Result<(), WriterError> {
        self.event(EVENT_DONE, &serde_json::Map::new()).await?;
        self.finished = true;
        Ok(())
    }

    /// Best-effort error signal after the response has been committed: write the
    /// HTML-escaped message as a comment and close the connection abnormally.
    pub async fn abort(mut self, err: &(dyn std::error::Error + Send + Sync)) {
        let reason = err.to_string();
        let escaped = html_escape(&reason);
        let bytes = escaped.len();
        let trailer = escaped
            .split(['\r', '\n'])
            .fold(Event::default(), |event, line| event.comment(line));

        self.finished = true;
        self.sink.abort(trailer, reason.clone()).await;
        self.observe(EVENT_ERROR, bytes, Some(reason));
    }

    /// Returns the size of the serialized payload.
    async fn write_event<T>(&mut self, name: &str, payload: &T) -> Result<usize, WriterError>
    where
        T: Serialize + ?Sized,
    {
        if self.finished {
            return Err(WriterError::Finished);
        }
        if name.is_empty() || name.contains(['\r', '\n']) {
            return Err(WriterError::InvalidEventName(name.to_string()));
        }
        let data = serde_json::to_string(payload)?;
        let bytes = data.len();
        self.sink
            .send(Event::default().event(name).data(data))
            .await?;
        self.frames += 1;
        Ok(bytes)
    }

    fn observe(&mut self, event: &str, bytes: usize, error: Option<String>) {
        let now = Instant::now();
        let stat = WriterStat {
            event: event.to_string(),
            bytes,
            duration: now.duration_since(self.last_write),
            error,
        };
        self.last_write = now;

        let hook = &self.hook;
        if std::panic::catch_unwind(AssertUnwindSafe(|| hook.observe(&stat))).is_err() {
            warn!(event = %stat.event, "stat hook panicked, ignoring");
        }
    }
}

/// Escape text for inclusion in an HTML-rendering client.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}
