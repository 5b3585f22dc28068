//! The streaming half of the blame request state machine.

use blamestream_protocol::EVENT_HUNK;
use tracing::{debug, info};

use super::writer::{EventWriter, FrameSink};
use crate::blame::{HunkReader, ReadOutcome};
use crate::trace::RequestTrace;

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// All hunks were sent, followed by the `done` frame.
    Completed { hunks: usize },
    /// The producer or the writer failed after `hunks` frames. No `done` frame was
    /// sent and the connection was closed abnormally.
    Aborted { hunks: usize, error: String },
}

/// Pull hunks from `reader` and emit them through `writer` until the reader is
/// exhausted or something fails.
///
/// Strictly sequential: one read, one write, repeat. The reader is dropped, and with
/// it any process or file handle it owns, before this returns.
pub async fn drive<S: FrameSink>(
    mut reader: Box<dyn HunkReader>,
    mut writer: EventWriter<S>,
    trace: &RequestTrace,
) -> StreamOutcome {
    let mut hunks = 0;

    let outcome = loop {
        match reader.read().await {
            ReadOutcome::Hunk(hunk) => {
                if let Err(err) = writer.event(EVENT_HUNK, &hunk).await {
                    trace.set_error(&err);
                    writer.abort(&err).await;
                    break StreamOutcome::Aborted {
                        hunks,
                        error: err.to_string(),
                    };
                }
                hunks += 1;
            }
            ReadOutcome::Done => {
                if let Err(err) = writer.done().await {
                    trace.set_error(&err);
                    writer.abort(&err).await;
                    break StreamOutcome::Aborted {
                        hunks,
                        error: err.to_string(),
                    };
                }
                break StreamOutcome::Completed { hunks };
            }
            ReadOutcome::Failed(err) => {
                trace.set_error(&err);
                writer.abort(&err).await;
                break StreamOutcome::Aborted {
                    hunks,
                    error: err.to_string(),
                };
            }
        }
    };

    drop(reader);
    match &outcome {
        StreamOutcome::Completed { hunks } => info!(hunks, "blame stream completed"),
        StreamOutcome::Aborted { hunks, error } => {
            debug!(hunks, error = %error, "blame stream aborted")
        }
    }
    outcome
}
