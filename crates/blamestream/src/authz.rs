//! Sub-repository permission checks.

use tracing::warn;

/// Decides whether a caller may see a path inside a repository.
pub trait SubRepoPerms: Send + Sync {
    fn can_read(&self, repo: &str, path: &str) -> bool;
}

/// Every path is visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl SubRepoPerms for AllowAll {
    fn can_read(&self, _repo: &str, _path: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DenyRule {
    /// `None` matches every repository.
    repo: Option<String>,
    prefix: String,
}

/// Hides paths under configured prefixes.
///
/// Rules have the form `<repo>:<path prefix>` or `*:<path prefix>`. A prefix matches
/// whole path components, so `secret` hides `secret/key.pem` but not `secrets.md`.
#[derive(Debug, Clone, Default)]
pub struct DenyPaths {
    rules: Vec<DenyRule>,
}

impl DenyPaths {
    /// Build from config entries. Malformed entries are skipped with a warning.
    pub fn parse(entries: &[String]) -> Self {
        let rules = entries
            .iter()
            .filter_map(|entry| {
                let Some((repo, prefix)) = entry.rsplit_once(':') else {
                    warn!(entry = %entry, "ignoring deny rule without ':'");
                    return None;
                };
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    warn!(entry = %entry, "ignoring deny rule with empty path");
                    return None;
                }
                Some(DenyRule {
                    repo: (repo != "*").then(|| repo.to_string()),
                    prefix: prefix.to_string(),
                })
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl SubRepoPerms for DenyPaths {
    fn can_read(&self, repo: &str, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        !self.rules.iter().any(|rule| {
            rule.repo.as_deref().is_none_or(|r| r == repo)
                && path
                    .strip_prefix(rule.prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}
