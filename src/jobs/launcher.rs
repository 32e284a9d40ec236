#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::Stdio;

use chrono::Local;
use tokio::io::AsyncWriteExt;

use crate::config::LauncherConfig;
use crate::error::{JobdropError, Result};
use crate::jobs::rewrite::{rewrite, ServerRegistry};
use crate::jobs::{JobDir, COMPLETE_MARKER, SUCCESS_MARKER};

/// Persist the upload as-is and write the rewritten copy next to it.
pub async fn stage_config(job: &JobDir, upload: &[u8], registry: &ServerRegistry) -> Result<()> {
    tokio::fs::write(job.original_config(), upload).await?;
    let rewritten = rewrite(upload, registry);
    tokio::fs::write(job.config(), rewritten).await?;
    Ok(())
}

/// Starts the analysis tool for a job and walks away.
///
/// The tool runs under a small shell wrapper:
/// - combined stdout/stderr is appended to `output.log`
/// - `success` is touched when the tool exits 0, `complete` otherwise
///
/// The `&& ... ||` continuation runs in the wrapper shell, not in this
/// process, so a crash, nonzero exit, signal, or missing binary still ends in
/// exactly one marker even if the server goes away meanwhile. If the shell
/// itself cannot be spawned the launcher writes `complete` before erroring.
#[derive(Debug, Clone)]
pub struct JobLauncher {
    config: LauncherConfig,
}

impl JobLauncher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    fn wrapper_script() -> String {
        format!(
            r#"log="$1"; dir="$2"; shift 2; "$@" >>"$log" 2>&1 && touch "$dir/{ok}" || touch "$dir/{done}""#,
            ok = SUCCESS_MARKER,
            done = COMPLETE_MARKER
        )
    }

    /// Write the header line to `output.log` and spawn the tool detached.
    ///
    /// Returns once the wrapper is running; the caller never waits for the
    /// tool itself.
    pub async fn launch(&self, job: &JobDir, submitter: &str) -> Result<()> {
        let header = format!(
            "Started output for job '{}', user '{}' at {}\n",
            job.name(),
            submitter,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        tokio::fs::write(job.log(), header).await?;

        let mut command = std::process::Command::new(&self.config.shell);
        command
            .arg("-c")
            .arg(Self::wrapper_script())
            .arg("jobdrop-job")
            .arg(job.log())
            .arg(job.root())
            .arg(&self.config.interpreter)
            .args(&self.config.interpreter_args)
            .arg(job.config())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Own process group: a Ctrl-C aimed at the server must not reach jobs.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match tokio::process::Command::from(command).spawn() {
            Ok(child) => child,
            Err(source) => {
                // No wrapper means nobody else will ever write a marker.
                self.mark_unstarted(job, &source).await;
                return Err(JobdropError::Launch {
                    job: job.name().to_string(),
                    source,
                });
            }
        };

        tracing::info!(
            job = job.name(),
            submitter,
            pid = ?child.id(),
            interpreter = %self.config.interpreter.display(),
            "Launched job"
        );

        // Reap the wrapper so it does not linger as a zombie.
        let name = job.name().to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    tracing::info!(job = %name, exit_code = ?status.code(), "Job wrapper exited")
                }
                Err(e) => tracing::warn!(job = %name, error = %e, "Failed to wait for job wrapper"),
            }
        });

        Ok(())
    }

    async fn mark_unstarted(&self, job: &JobDir, error: &std::io::Error) {
        let line = format!(
            "Failed to start job with shell '{}': {}\n",
            self.config.shell.display(),
            error
        );
        let appended = async {
            let mut log = tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(job.log())
                .await?;
            log.write_all(line.as_bytes()).await
        }
        .await;
        if let Err(e) = appended {
            tracing::warn!(job = job.name(), error = %e, "Failed to record launch error in log");
        }
        if let Err(e) = tokio::fs::write(job.complete_marker(), b"").await {
            tracing::error!(job = job.name(), error = %e, "Failed to mark unstarted job");
        }
    }
}
