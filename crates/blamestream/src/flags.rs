//! Feature flags, evaluated per request.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::AppState;
use crate::config::FeaturesConfig;

/// Gates the streaming blame endpoint.
pub const STREAMING_GIT_BLAME: &str = "enable-streaming-git-blame";

/// Request header carrying per-request overrides: `name` enables, `-name` disables.
pub const OVERRIDE_HEADER: &str = "x-feature-flags";

/// Boolean flags by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    flags: HashMap<String, bool>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(features: &FeaturesConfig) -> Self {
        let mut flags = Self::new();
        flags.set(STREAMING_GIT_BLAME, features.enable_streaming_git_blame);
        flags
    }

    pub fn set(&mut self, name: impl Into<String>, value: bool) {
        self.flags.insert(name.into(), value);
    }

    /// Value of `name`, or `default` when the flag is unknown.
    pub fn get_bool_or(&self, name: &str, default: bool) -> bool {
        self.flags.get(name).copied().unwrap_or(default)
    }

    /// Copy with overrides from an `X-Feature-Flags` header value applied.
    pub fn with_overrides(&self, header: &str) -> Self {
        let mut flags = self.clone();
        for item in header.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.strip_prefix('-') {
                Some(name) if !name.is_empty() => flags.set(name, false),
                Some(_) => {}
                None => flags.set(item, true),
            }
        }
        flags
    }
}

/// Flags as seen by the current request.
#[derive(Debug, Clone)]
pub struct RequestFlags(pub FlagSet);

impl FromRequestParts<AppState> for RequestFlags {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let base = state.flags();
        if !state.config().features.allow_header_overrides {
            return Ok(Self(base.clone()));
        }
        let flags = match parts
            .headers
            .get(OVERRIDE_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            Some(header) => base.with_overrides(header),
            None => base.clone(),
        };
        Ok(Self(flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_flag_uses_default() {
        let flags = FlagSet::new();
        assert!(!flags.get_bool_or(STREAMING_GIT_BLAME, false));
        assert!(flags.get_bool_or(STREAMING_GIT_BLAME, true));
    }

    #[test]
    fn test_from_config() {
        let features = FeaturesConfig {
            enable_streaming_git_blame: false,
            allow_header_overrides: false,
        };
        let flags = FlagSet::from_config(&features);
        assert!(!flags.get_bool_or(STREAMING_GIT_BLAME, true));
    }

    #[test]
    fn test_header_overrides() {
        let mut base = FlagSet::new();
        base.set("a", true);
        base.set("b", false);

        let flags = base.with_overrides(" -a, b ,c,-, ");
        assert!(!flags.get_bool_or("a", true));
        assert!(flags.get_bool_or("b", false));
        assert!(flags.get_bool_or("c", false));
        // base is untouched
        assert!(base.get_bool_or("a", false));
    }
}
