//! Test utilities and common setup.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::response::Response;
use blamestream::api::{self, AppState};
use blamestream::authz::SubRepoPerms;
use blamestream::blame::{BlameError, BlameRequest, BlameSource, HunkReader, ReadOutcome};
use blamestream::config::AppConfig;
use blamestream::flags::{FlagSet, STREAMING_GIT_BLAME};
use blamestream::protocol::{Author, Frame, Hunk, decode_frames};
use blamestream::repo::{RepoHints, RepoResolver, ResolveError, ResolvedRepo};
use blamestream::stream::{ContextError, StreamContext};
use chrono::DateTime;
use futures::StreamExt;
use tokio::sync::oneshot;

pub const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

/// One scripted producer step.
#[derive(Debug, Clone)]
pub enum Step {
    Hunk(Hunk),
    Done,
    Fail(String),
    /// Block until the request context finishes and report what ended it.
    Block,
}

pub fn hunk(start_line: u32, lines: u32) -> Hunk {
    Hunk {
        start_line,
        end_line: start_line + lines,
        commit_id: COMMIT.to_string(),
        author: Author {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            date: DateTime::parse_from_rfc3339("2021-03-04T05:06:07+01:00").unwrap(),
        },
        message: format!("touch line {start_line}"),
        filename: "mux.go".to_string(),
    }
}

/// Resolver that knows a single repository.
pub struct StaticResolver {
    pub name: String,
    pub seen: Mutex<Vec<RepoHints>>,
}

#[async_trait]
impl RepoResolver for StaticResolver {
    async fn resolve(
        &self,
        _ctx: &StreamContext,
        hints: &RepoHints,
    ) -> Result<ResolvedRepo, ResolveError> {
        self.seen.lock().unwrap().push(hints.clone());
        if hints.name != self.name {
            return Err(ResolveError::RepoNotFound(hints.name.clone()));
        }
        if hints.rev.as_deref() == Some("missing") {
            return Err(ResolveError::RevisionNotFound {
                repo: hints.name.clone(),
                rev: "missing".to_string(),
            });
        }
        Ok(ResolvedRepo {
            name: hints.name.clone(),
            git_dir: PathBuf::from("/nonexistent"),
            commit: COMMIT.to_string(),
        })
    }
}

/// What the scripted producer observed.
#[derive(Default)]
pub struct Probe {
    pub requests: Mutex<Vec<BlameRequest>>,
    pub dropped: Mutex<bool>,
    pub ended_by: Mutex<Option<oneshot::Sender<ContextError>>>,
}

impl Probe {
    pub fn opens(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> BlameRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

pub struct ScriptedSource {
    pub steps: Vec<Step>,
    /// Fail `open` with this error instead of returning a reader.
    pub open_error: Option<fn() -> BlameError>,
    pub probe: Arc<Probe>,
}

#[async_trait]
impl BlameSource for ScriptedSource {
    async fn open(
        &self,
        ctx: &StreamContext,
        _perms: Arc<dyn SubRepoPerms>,
        request: BlameRequest,
    ) -> Result<Box<dyn HunkReader>, BlameError> {
        self.probe.requests.lock().unwrap().push(request);
        if let Some(make_error) = self.open_error {
            return Err(make_error());
        }
        Ok(Box::new(ScriptedReader {
            ctx: ctx.clone(),
            steps: self.steps.clone().into(),
            probe: self.probe.clone(),
        }))
    }
}

struct ScriptedReader {
    ctx: StreamContext,
    steps: VecDeque<Step>,
    probe: Arc<Probe>,
}

#[async_trait]
impl HunkReader for ScriptedReader {
    async fn read(&mut self) -> ReadOutcome {
        match self.steps.pop_front() {
            Some(Step::Hunk(hunk)) => ReadOutcome::Hunk(hunk),
            Some(Step::Done) | None => ReadOutcome::Done,
            Some(Step::Fail(msg)) => ReadOutcome::Failed(BlameError::Parse(msg)),
            Some(Step::Block) => {
                let err = self.ctx.done().await;
                if let Some(tx) = self.probe.ended_by.lock().unwrap().take() {
                    let _ = tx.send(err);
                }
                ReadOutcome::Failed(err.into())
            }
        }
    }
}

impl Drop for ScriptedReader {
    fn drop(&mut self) {
        *self.probe.dropped.lock().unwrap() = true;
    }
}

pub const REPO: &str = "github.com/gorilla/mux";

pub struct TestApp {
    pub router: Router,
    pub probe: Arc<Probe>,
    pub resolver: Arc<StaticResolver>,
}

pub struct AppBuilder {
    config: AppConfig,
    steps: Vec<Step>,
    open_error: Option<fn() -> BlameError>,
    streaming_enabled: bool,
}

pub fn app(steps: Vec<Step>) -> AppBuilder {
    AppBuilder {
        config: AppConfig::default(),
        steps,
        open_error: None,
        streaming_enabled: true,
    }
}

impl AppBuilder {
    pub fn streaming(mut self, enabled: bool) -> Self {
        self.streaming_enabled = enabled;
        self
    }

    pub fn header_overrides(mut self) -> Self {
        self.config.features.allow_header_overrides = true;
        self
    }

    pub fn open_error(mut self, make_error: fn() -> BlameError) -> Self {
        self.open_error = Some(make_error);
        self
    }

    pub fn build(self) -> TestApp {
        let probe = Arc::new(Probe::default());
        let resolver = Arc::new(StaticResolver {
            name: REPO.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let source = ScriptedSource {
            steps: self.steps,
            open_error: self.open_error,
            probe: probe.clone(),
        };

        let mut flags = FlagSet::new();
        flags.set(STREAMING_GIT_BLAME, self.streaming_enabled);

        let state = AppState::new(self.config)
            .with_resolver(resolver.clone())
            .with_blame_source(Arc::new(source))
            .with_flags(flags);

        TestApp {
            router: api::create_router(state),
            probe,
            resolver,
        }
    }
}

/// Everything a client saw on one stream.
pub struct Received {
    pub frames: Vec<Frame>,
    pub raw: String,
    /// The body ended with an error instead of a clean end of stream.
    pub aborted: bool,
}

/// Read a streaming response to its end. Works for aborted bodies, unlike
/// `axum::body::to_bytes`.
pub async fn read_stream(response: Response) -> Received {
    read_body(response.into_body()).await
}

pub async fn read_body(body: Body) -> Received {
    let mut raw = Vec::new();
    let mut frames = Vec::new();
    let mut aborted = false;

    {
        let chunks = body.into_data_stream().inspect(|chunk| {
            if let Ok(chunk) = chunk {
                raw.extend_from_slice(chunk);
            }
        });
        let mut decoded = std::pin::pin!(decode_frames(chunks));
        while let Some(frame) = decoded.next().await {
            match frame {
                Ok(frame) => frames.push(frame),
                Err(_) => {
                    aborted = true;
                    break;
                }
            }
        }
    }

    Received {
        frames,
        raw: String::from_utf8_lossy(&raw).into_owned(),
        aborted,
    }
}
