//! Application state shared across handlers.

use std::sync::Arc;

use crate::authz::{AllowAll, DenyPaths, SubRepoPerms};
use crate::blame::{BlameSource, GitBlameSource};
use crate::config::AppConfig;
use crate::flags::FlagSet;
use crate::repo::{LocalRepoResolver, RepoResolver};

/// Immutable per-server state. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    flags: Arc<FlagSet>,
    /// Turns `repo[@rev]` into a commit.
    pub resolver: Arc<dyn RepoResolver>,
    /// Opens blame producers.
    pub blame: Arc<dyn BlameSource>,
    /// Sub-repository permissions handed to producers.
    pub perms: Arc<dyn SubRepoPerms>,
}

impl AppState {
    /// State backed by local git repositories, as described by `config`.
    pub fn new(config: AppConfig) -> Self {
        let resolver = LocalRepoResolver::new(config.repos_root(), &config.repos.git_binary);
        let blame = GitBlameSource::new(&config.repos.git_binary);
        let deny = DenyPaths::parse(&config.authz.deny_paths);
        let perms: Arc<dyn SubRepoPerms> = if deny.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(deny)
        };

        Self {
            flags: Arc::new(FlagSet::from_config(&config.features)),
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            blame: Arc::new(blame),
            perms,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn RepoResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_blame_source(mut self, blame: Arc<dyn BlameSource>) -> Self {
        self.blame = blame;
        self
    }

    pub fn with_perms(mut self, perms: Arc<dyn SubRepoPerms>) -> Self {
        self.perms = perms;
        self
    }

    pub fn with_flags(mut self, flags: FlagSet) -> Self {
        self.flags = Arc::new(flags);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }
}
