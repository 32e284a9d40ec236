//! Shared fixtures for integration tests.
//!
//! Builds a throwaway output directory, secret and attempt log, and an axum
//! router whose client address is fixed with `MockConnectInfo`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::MockConnectInfo;
use axum::Router;
use tempfile::TempDir;

use jobdrop::config::LauncherConfig;
use jobdrop::gate::CredentialGate;
use jobdrop::jobs::{FsJobStore, JobLauncher, ServerRegistry};
use jobdrop::web::{self, AppState};

pub const SECRET: &str = "correct-horse";
pub const BOUNDARY: &str = "jobdrop-test-boundary";

pub fn client_addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 7], 4242))
}

pub struct TestEnv {
    pub dir: TempDir,
    pub output_dir: PathBuf,
    pub attempt_log: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let output_dir = dir.path().join("jobs");
        std::fs::create_dir_all(&output_dir).unwrap();
        let attempt_log = dir.path().join("password_log.txt");
        Self {
            dir,
            output_dir,
            attempt_log,
        }
    }

    /// State whose tool is `sh -c <script> <config.ini>`.
    pub fn state_with_script(&self, script: &str, max_attempts: usize) -> AppState {
        let gate = CredentialGate::new(SECRET.to_string(), self.attempt_log.clone(), max_attempts);
        let registry = ServerRegistry::new([("zinu", "/home/max/servers/zinu")]).unwrap();
        AppState {
            gate: Arc::new(gate),
            store: Arc::new(FsJobStore::new(self.output_dir.clone())),
            launcher: Arc::new(JobLauncher::new(sh_launcher(script))),
            registry: Arc::new(registry),
            output_dir: Arc::new(self.output_dir.clone()),
        }
    }

    pub fn app(&self) -> Router {
        self.app_with_script("echo analysing \"$0\"", 100)
    }

    pub fn app_with_script(&self, script: &str, max_attempts: usize) -> Router {
        web::router(self.state_with_script(script, max_attempts), 1 << 20)
            .layer(MockConnectInfo(client_addr()))
    }

    /// Lay out a job by hand: a log plus whichever markers are requested.
    pub fn make_job(&self, name: &str, log: &str, markers: &[&str]) -> PathBuf {
        let root = self.output_dir.join(name);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("output.log"), log).unwrap();
        for marker in markers {
            std::fs::write(root.join(marker), "").unwrap();
        }
        root
    }

    pub fn job_dirs(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.output_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }
}

pub fn sh_launcher(script: &str) -> LauncherConfig {
    LauncherConfig {
        shell: PathBuf::from("sh"),
        interpreter: PathBuf::from("sh"),
        interpreter_args: vec!["-c".to_string(), script.to_string()],
    }
}

/// Poll until `path` exists or the timeout elapses.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    path.exists()
}

/// Wait for either terminal marker of a job directory.
pub async fn wait_for_marker(job_root: &Path) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if job_root.join("success").exists() || job_root.join("complete").exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Hand-rolled `multipart/form-data` body.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str)>) -> String {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some((filename, contents)) = file {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"inifile\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{contents}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

/// Same as [`multipart_body`] but with a file whose contents are raw bytes.
pub fn multipart_bytes(fields: &[(&str, &str)], filename: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"inifile\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn submit_request(body: impl Into<axum::body::Body>) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri("/submit")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body.into())
        .unwrap()
}

pub fn get_request(uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}
