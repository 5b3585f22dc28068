//! Request-scoped tracing for blame streams.

use std::fmt::Display;

use tracing::{Span, debug, error, field};

use crate::repo::ResolvedRepo;
use crate::stream::WriterStat;

/// Span covering one streaming request, from validation until the stream ends.
///
/// Cloning shares the span. The span closes once the handler and the streaming task
/// have both dropped their handle.
#[derive(Debug, Clone)]
pub struct RequestTrace {
    span: Span,
}

impl RequestTrace {
    pub fn new(route: &str) -> Self {
        let span = tracing::info_span!(
            "blame.stream",
            route = %route,
            repo = field::Empty,
            commit = field::Empty,
            path = field::Empty,
            error = field::Empty,
        );
        Self { span }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_target(&self, repo: &ResolvedRepo, path: &str) {
        self.span.record("repo", repo.name.as_str());
        self.span.record("commit", repo.commit.as_str());
        self.span.record("path", path);
    }

    /// Mark the request as failed.
    pub fn set_error(&self, err: &dyn Display) {
        let message = err.to_string();
        self.span.record("error", message.as_str());
        self.span.in_scope(|| error!(error = %message, "blame stream failed"));
    }

    /// Record one frame write.
    pub fn log_stat(&self, stat: &WriterStat) {
        let duration_ms = stat.duration.as_secs_f64() * 1000.0;
        self.span.in_scope(|| match &stat.error {
            Some(err) => debug!(
                streamhttp.event = %stat.event,
                bytes = stat.bytes,
                duration_ms,
                error = %err,
                "frame write failed"
            ),
            None => debug!(
                streamhttp.event = %stat.event,
                bytes = stat.bytes,
                duration_ms,
                "frame written"
            ),
        });
    }
}
