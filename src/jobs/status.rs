use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{JobdropError, Result};
use crate::jobs::name::{is_valid_job_name, submitted_at};
use crate::jobs::JobDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub status: JobStatus,
    pub submitted_at: Option<NaiveDateTime>,
}

/// Read side of job state.
///
/// Every call is a fresh scan; nothing is cached. Name-taking methods refuse
/// names that fail [`is_valid_job_name`].
pub trait JobStore: Send + Sync {
    /// Jobs that have been launched, most recent first.
    fn list_jobs(&self) -> Result<Vec<String>>;

    /// `None` when the job does not exist or was never launched.
    fn status(&self, name: &str) -> Result<Option<JobStatus>>;

    fn currently_running(&self) -> Result<BTreeSet<String>>;

    fn succeeded(&self) -> Result<BTreeSet<String>>;

    fn failed(&self) -> Result<BTreeSet<String>>;

    fn read_log(&self, name: &str) -> Result<Option<String>>;

    /// The upload byte for byte; it need not be UTF-8.
    fn read_original_config(&self, name: &str) -> Result<Option<Vec<u8>>>;

    fn summaries(&self) -> Result<Vec<JobSummary>> {
        let mut out = Vec::new();
        for name in self.list_jobs()? {
            if let Some(status) = self.status(&name)? {
                out.push(JobSummary {
                    submitted_at: submitted_at(&name),
                    name,
                    status,
                });
            }
        }
        Ok(out)
    }
}

/// Marker files under the output directory.
#[derive(Debug, Clone)]
pub struct FsJobStore {
    output_dir: PathBuf,
}

impl FsJobStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn job(&self, name: &str) -> Result<JobDir> {
        if !is_valid_job_name(name) {
            return Err(JobdropError::InvalidJobName(name.to_string()));
        }
        Ok(JobDir::new(&self.output_dir, name))
    }

    fn select<F>(&self, keep: F) -> Result<BTreeSet<String>>
    where
        F: Fn(&JobDir) -> bool,
    {
        Ok(self
            .list_jobs()?
            .into_iter()
            .filter(|name| keep(&JobDir::new(&self.output_dir, name)))
            .collect())
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl JobStore for FsJobStore {
    fn list_jobs(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut jobs: Vec<(Option<NaiveDateTime>, Option<SystemTime>, String)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_valid_job_name(&name) || !entry.file_type()?.is_dir() {
                continue;
            }
            if !JobDir::new(&self.output_dir, &name).log().is_file() {
                continue;
            }
            let fs_time = entry
                .metadata()
                .ok()
                .and_then(|m| m.created().or_else(|_| m.modified()).ok());
            jobs.push((submitted_at(&name), fs_time, name));
        }

        // Embedded creation time first, then filesystem time, then name.
        jobs.sort_by(|a, b| b.cmp(a));
        Ok(jobs.into_iter().map(|(_, _, name)| name).collect())
    }

    fn status(&self, name: &str) -> Result<Option<JobStatus>> {
        let job = self.job(name)?;
        let status = if job.success_marker().exists() {
            Some(JobStatus::Succeeded)
        } else if job.complete_marker().exists() {
            Some(JobStatus::Failed)
        } else if job.log().is_file() {
            Some(JobStatus::Running)
        } else {
            None
        };
        Ok(status)
    }

    fn currently_running(&self) -> Result<BTreeSet<String>> {
        self.select(|job| !job.success_marker().exists() && !job.complete_marker().exists())
    }

    fn succeeded(&self) -> Result<BTreeSet<String>> {
        self.select(|job| job.success_marker().exists())
    }

    fn failed(&self) -> Result<BTreeSet<String>> {
        self.select(|job| job.complete_marker().exists() && !job.success_marker().exists())
    }

    fn read_log(&self, name: &str) -> Result<Option<String>> {
        let log = read_optional(&self.job(name)?.log())?;
        Ok(log.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_original_config(&self, name: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&self.job(name)?.original_config())
    }
}
