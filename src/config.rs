use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{JobdropError, Result};

const DEFAULT_MAX_ATTEMPTS: usize = 100;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Top-level service configuration, loaded once at startup.
///
/// The value is never mutated after [`AppConfig::from_file`] returns; every
/// component receives the section it needs at construction time.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub gate: GateConfig,
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Network share name to local path prefix, applied in file order.
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Upper bound on the multipart request body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory holding one subdirectory per job.
    pub output_dir: PathBuf,
}

/// Shared-secret gate settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Plain text file containing only the secret. Must live outside the
    /// service's working tree.
    pub secret_file: PathBuf,
    /// Append-only record of failed attempts.
    pub attempt_log: PathBuf,
    /// Once the attempt log holds this many lines every submission is refused.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

/// How the external analysis tool is invoked. The rewritten config path is
/// appended as the final argument.
#[derive(Debug, Clone, Deserialize)]
pub struct LauncherConfig {
    /// POSIX shell that runs the marker wrapper.
    #[serde(default = "default_shell")]
    pub shell: PathBuf,
    pub interpreter: PathBuf,
    #[serde(default)]
    pub interpreter_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerEntry {
    pub share: String,
    pub path: String,
}

fn default_shell() -> PathBuf {
    PathBuf::from("sh")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file, apply `JOBDROP_*` environment
    /// overrides and validate the result.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            JobdropError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Supported variables:
    /// - `JOBDROP_LISTEN_ADDR`: overrides `server.listen_addr`
    /// - `JOBDROP_OUTPUT_DIR`: overrides `paths.output_dir`
    /// - `JOBDROP_LOG_LEVEL`: overrides `logging.level`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("JOBDROP_LISTEN_ADDR") {
            self.server.listen_addr = addr.parse().map_err(|e| {
                JobdropError::Config(format!("invalid JOBDROP_LISTEN_ADDR {:?}: {}", addr, e))
            })?;
        }
        if let Some(dir) = lookup("JOBDROP_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("JOBDROP_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.paths.output_dir.as_os_str().is_empty() {
            return Err(JobdropError::Config("paths.output_dir must be set".into()));
        }
        if self.launcher.shell.as_os_str().is_empty() {
            return Err(JobdropError::Config("launcher.shell must not be empty".into()));
        }
        if self.launcher.interpreter.as_os_str().is_empty() {
            return Err(JobdropError::Config("launcher.interpreter must be set".into()));
        }
        if self.gate.max_attempts == 0 {
            return Err(JobdropError::Config(
                "gate.max_attempts must be greater than zero".into(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(JobdropError::Config(
                "server.max_upload_bytes must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.servers {
            if entry.share.trim().is_empty() || entry.path.trim().is_empty() {
                return Err(JobdropError::Config(
                    "servers entries need both share and path".into(),
                ));
            }
            if !seen.insert(entry.share.to_lowercase()) {
                return Err(JobdropError::Config(format!(
                    "share {:?} is listed more than once",
                    entry.share
                )));
            }
        }
        Ok(())
    }
}
