//! Blame producers.
//!
//! A [`BlameSource`] opens a [`HunkReader`] for one file at one commit. The reader is
//! a pull-based cursor: each [`HunkReader::read`] yields the next hunk, reports that
//! the history is exhausted, or fails.

mod error;
mod git;
mod porcelain;

use std::sync::Arc;

use async_trait::async_trait;
use blamestream_protocol::Hunk;

pub use error::BlameError;
pub use git::{GitBlameReader, GitBlameSource};
pub use porcelain::IncrementalParser;

use crate::authz::SubRepoPerms;
use crate::repo::ResolvedRepo;
use crate::stream::StreamContext;

/// Result of one pull from a [`HunkReader`].
#[derive(Debug)]
pub enum ReadOutcome {
    /// The next hunk, newest history first.
    Hunk(Hunk),
    /// No more hunks. Not an error.
    Done,
    /// The walk was aborted.
    Failed(BlameError),
}

/// Pull-based cursor over blame hunks.
///
/// Implementations must honor the [`StreamContext`] they were opened with: once it is
/// cancelled or past its deadline, `read` returns `Failed` promptly instead of
/// blocking. Dropping the reader releases everything it holds.
#[async_trait]
pub trait HunkReader: Send {
    async fn read(&mut self) -> ReadOutcome;
}

/// Options forwarded to the producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlameOptions {
    /// Ignore whitespace-only changes when attributing lines.
    pub ignore_whitespace: bool,
}

/// One file to blame at one resolved commit.
#[derive(Debug, Clone)]
pub struct BlameRequest {
    pub repo: ResolvedRepo,
    /// Repository-relative path. Never starts with `/`.
    pub path: String,
    pub options: BlameOptions,
}

/// Factory for [`HunkReader`]s.
#[async_trait]
pub trait BlameSource: Send + Sync {
    /// Open a reader for `request`.
    ///
    /// `perms` decides whether the caller may see the file at all; paths it denies
    /// are reported as not found.
    async fn open(
        &self,
        ctx: &StreamContext,
        perms: Arc<dyn SubRepoPerms>,
        request: BlameRequest,
    ) -> Result<Box<dyn HunkReader>, BlameError>;
}
