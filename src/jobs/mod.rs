//! Job lifecycle on the filesystem.
//!
//! There is no job database: a job is a directory under the output directory,
//! and its state is whatever files that directory holds.
//!
//! # Layout
//!
//! ```text
//! <output_dir>/<job>/config.original.ini   as uploaded
//! <output_dir>/<job>/config.ini            rewritten for this host
//! <output_dir>/<job>/output.log            append-only tool output
//! <output_dir>/<job>/success | complete    zero-byte terminal marker
//! ```
//!
//! # Components
//!
//! - [`name`]: job name allocation and validation
//! - [`rewrite`]: share-path rewriting of uploaded configs
//! - [`launcher`]: fire-and-forget process launch with guaranteed marker
//! - [`status`]: point-in-time status scans behind [`JobStore`]

pub mod launcher;
pub mod name;
pub mod rewrite;
pub mod status;

use std::path::{Path, PathBuf};

pub use launcher::JobLauncher;
pub use name::{allocate_name, is_valid_job_name, sanitize_label};
pub use rewrite::{rewrite, ServerRegistry};
pub use status::{FsJobStore, JobStatus, JobStore, JobSummary};

pub const ORIGINAL_CONFIG_FILE: &str = "config.original.ini";
pub const CONFIG_FILE: &str = "config.ini";
pub const LOG_FILE: &str = "output.log";
pub const SUCCESS_MARKER: &str = "success";
pub const COMPLETE_MARKER: &str = "complete";

/// Paths of a single job's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDir {
    name: String,
    root: PathBuf,
}

impl JobDir {
    pub fn new(output_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: output_dir.join(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn original_config(&self) -> PathBuf {
        self.root.join(ORIGINAL_CONFIG_FILE)
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn log(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn success_marker(&self) -> PathBuf {
        self.root.join(SUCCESS_MARKER)
    }

    pub fn complete_marker(&self) -> PathBuf {
        self.root.join(COMPLETE_MARKER)
    }
}
