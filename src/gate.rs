//! Shared-secret gate for job submission.
//!
//! The gate is deliberately crude: a single secret read from a file, and an
//! append-only log of every rejected attempt. When that log reaches
//! `max_attempts` lines the gate refuses everything, correct secret included,
//! until an operator inspects and truncates the log.

use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};

use chrono::Local;
use tokio::io::AsyncWriteExt;

use crate::config::GateConfig;
use crate::error::{JobdropError, Result};

#[derive(Debug, Clone)]
pub struct CredentialGate {
    secret: String,
    attempt_log: PathBuf,
    max_attempts: usize,
}

impl CredentialGate {
    /// Load the secret and verify it is safe to serve with.
    ///
    /// `protected_dir` is the tree the service runs from; a secret file inside
    /// it is one `git add` away from being published, so startup aborts.
    pub fn load(config: &GateConfig, protected_dir: &Path) -> Result<Self> {
        let secret_file = &config.secret_file;

        let depth = secret_file
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count();
        if depth < 2 {
            return Err(JobdropError::InsecureSecretPath(format!(
                "{} is a short relative path",
                secret_file.display()
            )));
        }

        let raw = std::fs::read_to_string(secret_file).map_err(|e| {
            JobdropError::Config(format!(
                "cannot read secret file {}: {}",
                secret_file.display(),
                e
            ))
        })?;

        let resolved = std::fs::canonicalize(secret_file)?;
        let protected = std::fs::canonicalize(protected_dir)?;
        if resolved.starts_with(&protected) {
            return Err(JobdropError::InsecureSecretPath(format!(
                "{} is inside {}",
                resolved.display(),
                protected.display()
            )));
        }

        let secret = raw.trim().to_string();
        if secret.is_empty() {
            return Err(JobdropError::EmptySecret(secret_file.display().to_string()));
        }

        Ok(Self::new(secret, config.attempt_log.clone(), config.max_attempts))
    }

    /// Build a gate from an already-validated secret.
    pub fn new(secret: String, attempt_log: PathBuf, max_attempts: usize) -> Self {
        Self {
            secret,
            attempt_log,
            max_attempts,
        }
    }

    pub fn attempt_log(&self) -> &Path {
        &self.attempt_log
    }

    /// Check `secret`, recording the attempt when it does not match.
    pub async fn authenticate(&self, secret: &str, client: IpAddr) -> Result<bool> {
        // Plain comparison: the attempt cap bounds guessing, not timing.
        if !self.secret.is_empty() && secret == self.secret {
            return Ok(true);
        }
        self.record_failure(secret, client).await?;
        Ok(false)
    }

    /// True once the attempt log holds `max_attempts` or more records.
    pub async fn attempts_exhausted(&self) -> Result<bool> {
        Ok(self.attempt_count().await? >= self.max_attempts)
    }

    pub async fn attempt_count(&self) -> Result<usize> {
        // Bytes, not text: hand edits or rejected secrets may not be UTF-8.
        match tokio::fs::read(&self.attempt_log).await {
            Ok(content) => Ok(count_lines(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_failure(&self, secret: &str, client: IpAddr) -> Result<()> {
        // Single write in append mode so concurrent records never interleave.
        let line = format!(
            "date={}, ip={}, password={}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            client,
            secret.replace(['\n', '\r'], " ")
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.attempt_log)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::warn!(client = %client, log = %self.attempt_log.display(), "Rejected submission secret");
        Ok(())
    }
}

/// Newline-terminated records, plus an unterminated final one if present.
fn count_lines(content: &[u8]) -> usize {
    let newlines = content.iter().filter(|&&b| b == b'\n').count();
    match content.last() {
        Some(&last) if last != b'\n' => newlines + 1,
        _ => newlines,
    }
}
