//! Repository and revision resolution.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::stream::{ContextError, StreamContext};

/// What the request named: a repository and, optionally, a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHints {
    pub name: String,
    /// Branch, tag or commit. `None` means the default branch (`HEAD`).
    pub rev: Option<String>,
}

/// A repository pinned to one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepo {
    pub name: String,
    /// Git directory (`.git` of a worktree, or a bare repository) commands are pinned to.
    pub git_dir: PathBuf,
    /// Full commit SHA.
    pub commit: String,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid repository name: {0}")]
    InvalidName(String),

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("revision {rev} not found in {repo}")]
    RevisionNotFound { repo: String, rev: String },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("git rev-parse failed: {0}")]
    Git(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns [`RepoHints`] into a [`ResolvedRepo`].
#[async_trait]
pub trait RepoResolver: Send + Sync {
    async fn resolve(
        &self,
        ctx: &StreamContext,
        hints: &RepoHints,
    ) -> Result<ResolvedRepo, ResolveError>;
}

/// Resolves repositories below a root directory, e.g. `github.com/gorilla/mux`
/// maps to `<root>/github.com/gorilla/mux` (or the bare `<root>/github.com/gorilla/mux.git`).
#[derive(Debug, Clone)]
pub struct LocalRepoResolver {
    root: PathBuf,
    git_binary: PathBuf,
}

impl LocalRepoResolver {
    pub fn new(root: impl Into<PathBuf>, git_binary: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git_binary: git_binary.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate the git directory of `name`.
    ///
    /// Only a repository root counts: `<name>/.git`, or a bare repository at `<name>`
    /// or `<name>.git`. A plain directory inside some repository is not one.
    async fn git_dir(&self, name: &str) -> Result<PathBuf, ResolveError> {
        validate_name(name)?;

        let plain = self.root.join(name);
        let dot_git = plain.join(".git");
        if tokio::fs::metadata(&dot_git).await.is_ok() {
            return Ok(dot_git);
        }
        if is_bare_repo(&plain).await {
            return Ok(plain);
        }
        let bare = self.root.join(format!("{name}.git"));
        if is_bare_repo(&bare).await {
            return Ok(bare);
        }
        Err(ResolveError::RepoNotFound(name.to_string()))
    }
}

async fn is_bare_repo(dir: &Path) -> bool {
    let head = tokio::fs::metadata(dir.join("HEAD")).await;
    let objects = tokio::fs::metadata(dir.join("objects")).await;
    matches!((head, objects), (Ok(head), Ok(objects)) if head.is_file() && objects.is_dir())
}

/// Names must be relative, clean, and must not point into a git directory: `r/.git`
/// or `r.git` would otherwise alias `r` under a different name.
fn validate_name(name: &str) -> Result<(), ResolveError> {
    let invalid = name.is_empty()
        || name.starts_with('/')
        || name.contains('\0')
        || name.ends_with(".git")
        || name
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == ".." || part == ".git");
    if invalid {
        return Err(ResolveError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl RepoResolver for LocalRepoResolver {
    async fn resolve(
        &self,
        ctx: &StreamContext,
        hints: &RepoHints,
    ) -> Result<ResolvedRepo, ResolveError> {
        let git_dir = self.git_dir(&hints.name).await?;
        let rev = hints.rev.as_deref().unwrap_or("HEAD");
        let not_found = || ResolveError::RevisionNotFound {
            repo: hints.name.clone(),
            rev: rev.to_string(),
        };
        // Anything starting with '-' would be read as an option.
        if rev.is_empty() || rev.starts_with('-') {
            return Err(not_found());
        }

        let mut cmd = Command::new(&self.git_binary);
        cmd.arg("--git-dir")
            .arg(&git_dir)
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("{rev}^{{commit}}"))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            err = ctx.done() => return Err(err.into()),
            output = cmd.output() => output?,
        };

        if !output.status.success() {
            // --quiet: exit 1 with no stderr means the revision does not exist.
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                return Err(not_found());
            }
            return Err(ResolveError::Git(stderr));
        }

        let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if commit.is_empty() {
            return Err(not_found());
        }
        debug!(repo = %hints.name, rev, commit = %commit, "resolved revision");

        Ok(ResolvedRepo {
            name: hints.name.clone(),
            git_dir,
            commit,
        })
    }
}
