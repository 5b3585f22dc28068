//! Blame producer errors.

use thiserror::Error;

use crate::stream::ContextError;

/// Errors raised while opening or reading a blame stream.
#[derive(Debug, Error)]
pub enum BlameError {
    /// File does not exist at the commit, or the caller may not see it.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Request context finished before the walk did.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The git process could not be started.
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    /// Reading git output failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// git exited unsuccessfully.
    #[error("git blame failed ({status}): {stderr}")]
    Git { status: String, stderr: String },

    /// git produced output we could not understand.
    #[error("malformed blame output: {0}")]
    Parse(String),

    /// `read` called after the reader already finished.
    #[error("blame reader is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BlameError::NotFound("mux.go".to_string());
        assert_eq!(err.to_string(), "file not found: mux.go");

        let err = BlameError::from(ContextError::DeadlineExceeded);
        assert_eq!(err.to_string(), "request deadline exceeded");
    }
}
