//! Blame producer backed by the `git` binary.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::porcelain::IncrementalParser;
use super::{BlameError, BlameRequest, BlameSource, HunkReader, ReadOutcome};
use crate::authz::SubRepoPerms;
use crate::stream::StreamContext;

/// Upper bound on captured git stderr.
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// Opens readers that run `git blame --incremental`.
#[derive(Debug, Clone)]
pub struct GitBlameSource {
    git_binary: PathBuf,
}

impl GitBlameSource {
    pub fn new(git_binary: impl Into<PathBuf>) -> Self {
        Self {
            git_binary: git_binary.into(),
        }
    }

    /// Check that `path` is a file at the commit before any response bytes are sent.
    ///
    /// A tree would pass `cat-file -e` and only fail once blame runs, after the
    /// response is committed.
    async fn ensure_file(
        &self,
        ctx: &StreamContext,
        request: &BlameRequest,
    ) -> Result<(), BlameError> {
        let object = format!("{}:{}", request.repo.commit, request.path);
        let mut cmd = Command::new(&self.git_binary);
        cmd.arg("--git-dir")
            .arg(&request.repo.git_dir)
            .args(["cat-file", "-t"])
            .arg(&object)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            err = ctx.done() => return Err(err.into()),
            output = cmd.output() => output.map_err(BlameError::Spawn)?,
        };
        if output.status.success() && output.stdout.trim_ascii() == b"blob" {
            Ok(())
        } else {
            Err(BlameError::NotFound(request.path.clone()))
        }
    }
}

#[async_trait]
impl BlameSource for GitBlameSource {
    async fn open(
        &self,
        ctx: &StreamContext,
        perms: Arc<dyn SubRepoPerms>,
        request: BlameRequest,
    ) -> Result<Box<dyn HunkReader>, BlameError> {
        if !perms.can_read(&request.repo.name, &request.path) {
            debug!(repo = %request.repo.name, path = %request.path, "path hidden by sub-repo permissions");
            return Err(BlameError::NotFound(request.path));
        }
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        self.ensure_file(ctx, &request).await?;

        let mut cmd = Command::new(&self.git_binary);
        cmd.arg("--git-dir")
            .arg(&request.repo.git_dir)
            .args(["blame", "--incremental"]);
        if request.options.ignore_whitespace {
            cmd.arg("-w");
        }
        cmd.arg(&request.repo.commit)
            .arg("--")
            .arg(&request.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            repo = %request.repo.name,
            commit = %request.repo.commit,
            path = %request.path,
            "spawning git blame"
        );
        let mut child = cmd.spawn().map_err(BlameError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BlameError::Spawn(std::io::Error::other("git stdout not captured")))?;
        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.take(MAX_STDERR_BYTES).read_to_string(&mut buf).await;
                buf
            })
        });

        Ok(Box::new(GitBlameReader {
            ctx: ctx.clone(),
            child,
            lines: BufReader::new(stdout).lines(),
            stderr,
            parser: IncrementalParser::new(),
            finished: false,
        }))
    }
}

/// Reader over a running `git blame --incremental` process.
///
/// The child is spawned with `kill_on_drop`, so dropping the reader on any path stops
/// the history walk.
pub struct GitBlameReader {
    ctx: StreamContext,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    parser: IncrementalParser,
    finished: bool,
}

impl GitBlameReader {
    async fn next_outcome(&mut self) -> ReadOutcome {
        loop {
            let line = tokio::select! {
                biased;
                err = self.ctx.done() => return ReadOutcome::Failed(err.into()),
                line = self.lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => match self.parser.feed_line(&line) {
                    Ok(Some(hunk)) => return ReadOutcome::Hunk(hunk),
                    Ok(None) => continue,
                    Err(err) => return ReadOutcome::Failed(err),
                },
                Ok(None) => return self.wait_for_exit().await,
                Err(err) => return ReadOutcome::Failed(err.into()),
            }
        }
    }

    async fn wait_for_exit(&mut self) -> ReadOutcome {
        let status = tokio::select! {
            biased;
            err = self.ctx.done() => return ReadOutcome::Failed(err.into()),
            status = self.child.wait() => status,
        };
        let status = match status {
            Ok(status) => status,
            Err(err) => return ReadOutcome::Failed(err.into()),
        };

        if !status.success() {
            let stderr = match self.stderr.take() {
                Some(handle) => handle.await.unwrap_or_default(),
                None => String::new(),
            };
            warn!(%status, stderr = %stderr.trim(), "git blame exited with failure");
            return ReadOutcome::Failed(BlameError::Git {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        match self.parser.finish() {
            Ok(()) => ReadOutcome::Done,
            Err(err) => ReadOutcome::Failed(err),
        }
    }
}

#[async_trait]
impl HunkReader for GitBlameReader {
    async fn read(&mut self) -> ReadOutcome {
        if self.finished {
            return ReadOutcome::Failed(BlameError::Closed);
        }
        let outcome = self.next_outcome().await;
        if !matches!(outcome, ReadOutcome::Hunk(_)) {
            self.finished = true;
        }
        outcome
    }
}
