//! Parsing of `/{repo}[@{rev}]/-/stream-blame/{path}` targets.

use super::error::ApiError;
use crate::repo::RepoHints;

/// Separates the repository from the file path.
pub const STREAM_BLAME_MARKER: &str = "/-/stream-blame";

/// A parsed stream-blame target. `path` is still raw; see [`normalize_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameRoute {
    pub repo: RepoHints,
    pub path: String,
}

impl BlameRoute {
    /// Parse the wildcard part of the request path (with or without its leading `/`).
    ///
    /// A target without the marker is not a stream-blame route at all (404). A target
    /// with the marker but no repository name is a bad request.
    pub fn parse(target: &str) -> Result<Self, ApiError> {
        let target = format!("/{}", target.trim_start_matches('/'));
        let Some(idx) = target.find(STREAM_BLAME_MARKER) else {
            return Err(ApiError::not_found(target));
        };
        let (repo_part, rest) = target.split_at(idx);
        let rest = &rest[STREAM_BLAME_MARKER.len()..];
        if !(rest.is_empty() || rest.starts_with('/')) {
            return Err(ApiError::not_found(target.clone()));
        }

        let repo_part = repo_part.trim_start_matches('/');
        let (name, rev) = match repo_part.split_once('@') {
            Some((name, rev)) => (name, (!rev.is_empty()).then(|| rev.to_string())),
            None => (repo_part, None),
        };
        if name.is_empty() {
            return Err(ApiError::bad_request("missing repository name"));
        }

        Ok(Self {
            repo: RepoHints {
                name: name.to_string(),
                rev,
            },
            path: rest.to_string(),
        })
    }
}

/// Strip every leading `/` and reject paths that cannot name a file in the repository.
pub fn normalize_path(raw: &str) -> Result<String, ApiError> {
    let path = raw.trim_start_matches('/');
    if path.is_empty() {
        return Err(ApiError::bad_request("missing file path"));
    }
    if path.contains('\0') {
        return Err(ApiError::bad_request("file path contains NUL"));
    }
    if path.split('/').any(|part| part == "..") {
        return Err(ApiError::bad_request("file path escapes the repository"));
    }
    Ok(path.to_string())
}
