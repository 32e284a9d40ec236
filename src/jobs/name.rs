use std::io::ErrorKind;
use std::path::Path;

use chrono::{Local, NaiveDateTime};

use crate::error::{JobdropError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const TIMESTAMP_LEN: usize = 19;
const DEFAULT_LABEL: &str = "job";
const MAX_CANDIDATES: usize = 10_000;

/// Strip everything outside `[A-Za-z0-9_]`, falling back to `job`.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        cleaned
    }
}

/// `<timestamp>_<label>` before collision suffixes.
pub fn base_name(label: &str, now: NaiveDateTime) -> String {
    format!("{}_{}", now.format(TIMESTAMP_FORMAT), sanitize_label(label))
}

/// A job name is valid only if filtering it to `[A-Za-z0-9_-]` leaves it
/// unchanged. Anything else (dots, slashes, spaces) is refused outright rather
/// than cleaned, so a request can never address a path it did not name.
pub fn is_valid_job_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Creation time embedded in a job name, if it has one.
pub fn submitted_at(name: &str) -> Option<NaiveDateTime> {
    let prefix = name.get(..TIMESTAMP_LEN)?;
    NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).ok()
}

/// Allocate a fresh job name and create its directory.
pub async fn allocate_name(output_dir: &Path, label: &str) -> Result<String> {
    allocate_name_at(output_dir, label, Local::now().naive_local()).await
}

/// Candidates are `base`, `base0`, `base1`, ... The directory is created with
/// `create_dir`, which fails on an existing entry, so the creation itself is
/// the uniqueness test and two concurrent submissions cannot share a name.
pub async fn allocate_name_at(output_dir: &Path, label: &str, now: NaiveDateTime) -> Result<String> {
    tokio::fs::create_dir_all(output_dir).await?;

    let base = base_name(label, now);
    let candidates = std::iter::once(base.clone())
        .chain((0..MAX_CANDIDATES).map(|n| format!("{}{}", base, n)));

    for candidate in candidates {
        match tokio::fs::create_dir(output_dir.join(&candidate)).await {
            Ok(()) => {
                tracing::debug!(job = %candidate, "Allocated job directory");
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(JobdropError::NameExhausted(base))
}
