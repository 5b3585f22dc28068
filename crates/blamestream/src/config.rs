//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then the TOML file, then
//! `BLAMESTREAM__<SECTION>__<KEY>` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "blamestream";
pub const ENV_PREFIX: &str = "BLAMESTREAM";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub repos: ReposConfig,
    pub stream: StreamConfig,
    pub features: FeaturesConfig,
    pub authz: AuthzConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReposConfig {
    /// Directory holding repositories, laid out by name (`github.com/gorilla/mux`).
    pub root: String,
    pub git_binary: String,
}

impl Default for ReposConfig {
    fn default() -> Self {
        Self {
            root: "~/.local/share/blamestream/repos".to_string(),
            git_binary: "git".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound on one blame stream. 0 disables the deadline.
    pub timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl StreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub enable_streaming_git_blame: bool,
    /// Honor the `X-Feature-Flags` request header.
    pub allow_header_overrides: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            enable_streaming_git_blame: true,
            allow_header_overrides: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// `<repo>:<path prefix>` or `*:<path prefix>` entries hidden from blame.
    pub deny_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (optional file) and the environment.
    ///
    /// `env` replaces the process environment as the override source when given.
    pub fn load(path: &Path, env: Option<config::Map<String, String>>) -> Result<Self> {
        let defaults = AppConfig::default();
        let built = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("logging.level", defaults.logging.level)?
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("authz.deny_paths")
                    .source(env),
            )
            .build()
            .with_context(|| format!("loading config from {}", path.display()))?;

        let mut config: AppConfig = built
            .try_deserialize()
            .context("deserializing configuration")?;
        config.repos.root = expand_str_path(&config.repos.root)?
            .display()
            .to_string();
        Ok(config)
    }

    pub fn repos_root(&self) -> PathBuf {
        PathBuf::from(&self.repos.root)
    }
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let toml = toml::to_string_pretty(&AppConfig::default())
        .context("serializing default config to TOML")?;
    let body = format!(
        "# Configuration for {APP_NAME}\n# File: {}\n\n{toml}",
        path.display()
    );
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// Config file path: `override_path` (a file, or a directory holding `config.toml`)
/// or the default location.
pub fn config_file_path(override_path: Option<&Path>) -> Result<PathBuf> {
    match override_path {
        Some(path) => {
            let expanded = match path.to_str() {
                Some(text) => expand_str_path(text)?,
                None => path.to_path_buf(),
            };
            if expanded.is_dir() {
                Ok(expanded.join("config.toml"))
            } else {
                Ok(expanded)
            }
        }
        None => Ok(default_config_dir()?.join("config.toml")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("missing.toml"), env(&[])).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.stream.timeout(), Duration::from_secs(60));
        assert!(config.features.enable_streaming_git_blame);
        assert!(!config.features.allow_header_overrides);
        assert!(config.authz.deny_paths.is_empty());
    }

    #[test]
    fn test_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
port = 9000

[repos]
root = "/srv/repos"

[stream]
timeout_secs = 0

[features]
enable_streaming_git_blame = false

[authz]
deny_paths = ["*:secret"]
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path, env(&[])).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.repos_root(), PathBuf::from("/srv/repos"));
        assert_eq!(config.stream.timeout(), Duration::ZERO);
        assert!(!config.features.enable_streaming_git_blame);
        assert_eq!(config.authz.deny_paths, vec!["*:secret".to_string()]);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = AppConfig::load(
            &path,
            env(&[
                ("BLAMESTREAM__SERVER__PORT", "9100"),
                ("BLAMESTREAM__STREAM__TIMEOUT_SECS", "5"),
                ("BLAMESTREAM__FEATURES__ENABLE_STREAMING_GIT_BLAME", "false"),
                ("UNRELATED__SERVER__PORT", "1"),
            ]),
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.stream.timeout_secs, 5);
        assert!(!config.features.enable_streaming_git_blame);
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Configuration for blamestream"));

        let loaded = AppConfig::load(&path, env(&[])).unwrap();
        assert_eq!(loaded.server, ServerConfig::default());
        assert_eq!(loaded.features, FeaturesConfig::default());
    }

    #[test]
    fn test_config_file_path_accepts_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(Some(dir.path())).unwrap();
        assert_eq!(path, dir.path().join("config.toml"));
    }
}
