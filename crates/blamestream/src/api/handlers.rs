//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::PathRejection},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug};

use super::error::{ApiError, ApiResult};
use super::route::{BlameRoute, normalize_path};
use super::state::AppState;
use crate::blame::{BlameOptions, BlameRequest};
use crate::flags::{RequestFlags, STREAMING_GIT_BLAME};
use crate::stream::{EventWriter, StatHook, StreamContext, WriterStat, drive, event_channel};
use crate::trace::RequestTrace;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Query parameters of the stream-blame endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StreamParams {
    pub ignore_whitespace: bool,
}

/// `GET /{repo}[@{rev}]/-/stream-blame/{path}`
///
/// Streams blame hunks as SSE `hunk` frames, newest history first, followed by one
/// `done` frame. Errors before the first frame are ordinary HTTP errors. Errors after
/// it write an escaped message and close the connection without `done`.
pub async fn stream_blame(
    State(state): State<AppState>,
    RequestFlags(flags): RequestFlags,
    target: Result<Path<String>, PathRejection>,
    uri: Uri,
) -> Response {
    if !flags.get_bool_or(STREAMING_GIT_BLAME, false) {
        // Indistinguishable from an unknown route.
        return StatusCode::NOT_FOUND.into_response();
    }

    let trace = RequestTrace::new("stream-blame");
    let result = match target {
        Ok(Path(target)) => {
            start_stream(state, &target, &uri, trace.clone())
                .instrument(trace.span().clone())
                .await
        }
        Err(err) => Err(ApiError::bad_request(err.body_text())),
    };

    match result {
        Ok(response) => response,
        Err(err) => {
            trace.set_error(&err);
            err.into_response()
        }
    }
}

async fn start_stream(
    state: AppState,
    target: &str,
    uri: &Uri,
    trace: RequestTrace,
) -> ApiResult<Response> {
    let route = BlameRoute::parse(target)?;
    let path = normalize_path(&route.path)?;
    let Query(params) = Query::<StreamParams>::try_from_uri(uri)
        .map_err(|err| ApiError::bad_request(err.body_text()))?;

    let ctx = StreamContext::with_timeout(state.config().stream.timeout());
    let repo = state.resolver.resolve(&ctx, &route.repo).await?;
    trace.record_target(&repo, &path);
    debug!(commit = %repo.commit, "resolved blame target");

    let (sink, events) = event_channel();
    sink.cancel_on_close(&ctx);

    let hook_trace = trace.clone();
    let hook: Arc<dyn StatHook> = Arc::new(move |stat: &WriterStat| hook_trace.log_stat(stat));
    let writer = EventWriter::open(sink, hook)?;

    let request = BlameRequest {
        repo,
        path,
        options: BlameOptions {
            ignore_whitespace: params.ignore_whitespace,
        },
    };
    let reader = match state.blame.open(&ctx, state.perms.clone(), request).await {
        Ok(reader) => reader,
        Err(err) => {
            ctx.cancel();
            return Err(err.into());
        }
    };

    let span = trace.span().clone();
    tokio::spawn(
        async move {
            let _cancel = ctx.cancel_on_drop();
            drive(reader, writer, &trace).await;
        }
        .instrument(span),
    );

    Ok(events.into_response())
}
