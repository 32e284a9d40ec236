//! HTTP surface.
//!
//! | Route              | Purpose                                      |
//! |--------------------|----------------------------------------------|
//! | `GET /`            | submission form, optional `m` banner         |
//! | `POST /submit`     | multipart upload, launches a job             |
//! | `GET /view`        | job list, or one job's log with `job=<name>` |
//! | `GET /ini`         | original uploaded config as plain text       |
//! | `GET /api/jobs`    | job list as JSON                             |
//! | `GET /api/jobs/:n` | one job as JSON                              |
//! | `GET /healthz`     | liveness                                     |

pub mod pages;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path as UrlPath, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::{JobdropError, Result};
use crate::gate::CredentialGate;
use crate::jobs::launcher::stage_config;
use crate::jobs::{
    allocate_name, is_valid_job_name, FsJobStore, JobDir, JobLauncher, JobStatus, JobStore,
    ServerRegistry,
};

pub const URGENT_ERROR: &str = "Urgent system error, please contact an admin immediately, \
who will be able to quickly figure out what to do once they see the server's logs.";

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<CredentialGate>,
    pub store: Arc<dyn JobStore>,
    pub launcher: Arc<JobLauncher>,
    pub registry: Arc<ServerRegistry>,
    pub output_dir: Arc<PathBuf>,
}

impl AppState {
    /// Wire up all components from `config`. Fails if the gate refuses to
    /// start (see [`CredentialGate::load`]).
    pub fn from_config(config: &AppConfig, protected_dir: &Path) -> Result<Self> {
        let gate = CredentialGate::load(&config.gate, protected_dir)?;
        let registry = ServerRegistry::from_config(&config.servers)?;
        Ok(Self {
            gate: Arc::new(gate),
            store: Arc::new(FsJobStore::new(config.paths.output_dir.clone())),
            launcher: Arc::new(JobLauncher::new(config.launcher.clone())),
            registry: Arc::new(registry),
            output_dir: Arc::new(config.paths.output_dir.clone()),
        })
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/submit", post(submit_handler))
        .route("/view", get(view_handler))
        .route("/ini", get(ini_handler))
        .route("/api/jobs", get(api_list_handler))
        .route("/api/jobs/:name", get(api_job_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `addr` until `shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, app: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind HTTP server");
        e
    })?;
    tracing::info!(addr = %addr, "Starting HTTP server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// `303` back to the form with a banner.
pub fn message_redirect(message: &str) -> Response {
    let encoded = pages::sanitize_message(message).replace(' ', "+");
    Redirect::to(&format!("/?m={}", encoded)).into_response()
}

fn internal_error(context: &str, err: JobdropError) -> Response {
    tracing::error!(error = %err, "{}", context);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

async fn with_store<T, F>(state: &AppState, f: F) -> Result<T>
where
    F: FnOnce(&dyn JobStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| JobdropError::Internal(format!("store task failed: {}", e)))?
}

#[derive(Deserialize)]
struct HomeQuery {
    m: Option<String>,
}

async fn home_handler(Query(query): Query<HomeQuery>) -> Html<String> {
    Html(pages::render_home(query.m.as_deref()))
}

#[derive(Default)]
struct SubmitForm {
    pass: String,
    jobname: String,
    username: String,
    upload: Option<(String, Bytes)>,
}

async fn read_submit_form(mut multipart: Multipart) -> std::result::Result<SubmitForm, Response> {
    let mut form = SubmitForm::default();
    while let Some(field) = multipart.next_field().await.map_err(IntoResponse::into_response)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "pass" => form.pass = field.text().await.map_err(IntoResponse::into_response)?,
            "jobname" => form.jobname = field.text().await.map_err(IntoResponse::into_response)?,
            "username" => form.username = field.text().await.map_err(IntoResponse::into_response)?,
            "inifile" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
                form.upload = Some((file_name, bytes));
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }
    Ok(form)
}

async fn submit_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Response {
    let form = match read_submit_form(multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    match state.gate.attempts_exhausted().await {
        Ok(false) => {}
        Ok(true) => {
            tracing::error!(
                log = %state.gate.attempt_log().display(),
                "Attempt log is full, refusing all submissions"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, URGENT_ERROR).into_response();
        }
        Err(e) => return internal_error("Failed to read attempt log", e),
    }

    match state.gate.authenticate(&form.pass, client.ip()).await {
        Ok(true) => {}
        Ok(false) => return message_redirect("Password incorrect"),
        Err(e) => return internal_error("Failed to record rejected secret", e),
    }

    let upload = match form.upload {
        Some((file_name, bytes)) if !file_name.is_empty() => bytes,
        _ => return message_redirect("No file uploaded"),
    };

    let name = match allocate_name(&state.output_dir, &form.jobname).await {
        Ok(name) => name,
        Err(e) => return internal_error("Failed to allocate job directory", e),
    };
    let job = JobDir::new(&state.output_dir, &name);

    if let Err(e) = stage_config(&job, &upload, &state.registry).await {
        return internal_error("Failed to store uploaded config", e);
    }
    if let Err(e) = state.launcher.launch(&job, &form.username).await {
        return internal_error("Failed to launch job", e);
    }

    Redirect::to(&format!("/view?job={}", name)).into_response()
}

#[derive(Deserialize)]
struct JobQuery {
    job: Option<String>,
}

async fn view_handler(State(state): State<AppState>, Query(query): Query<JobQuery>) -> Response {
    let Some(name) = query.job else {
        return match with_store(&state, |store| store.summaries()).await {
            Ok(jobs) => Html(pages::render_job_list(&jobs)).into_response(),
            Err(e) => internal_error("Failed to list jobs", e),
        };
    };

    if !is_valid_job_name(&name) {
        tracing::warn!(job = %name, "Rejected job name");
        return message_redirect("Invalid file");
    }

    let lookup = name.clone();
    let found = with_store(&state, move |store| {
        Ok((store.read_log(&lookup)?, store.status(&lookup)?))
    })
    .await;

    match found {
        Ok((Some(log), status)) => Html(pages::render_job(&name, &log, status)).into_response(),
        Ok((None, _)) => message_redirect("No such job"),
        Err(e) => internal_error("Failed to read job", e),
    }
}

async fn ini_handler(State(state): State<AppState>, Query(query): Query<JobQuery>) -> Response {
    let name = match query.job {
        Some(name) if is_valid_job_name(&name) => name,
        _ => return message_redirect("Invalid file"),
    };

    match with_store(&state, move |store| store.read_original_config(&name)).await {
        // Served as uploaded; no charset is claimed for foreign encodings.
        Ok(Some(contents)) => (
            [(header::CONTENT_TYPE, "text/plain")],
            contents,
        )
            .into_response(),
        Ok(None) => message_redirect("No such job"),
        Err(e) => internal_error("Failed to read original config", e),
    }
}

#[derive(Serialize)]
struct JobDetailResponse {
    name: String,
    status: JobStatus,
    submitted_at: Option<NaiveDateTime>,
    log: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

async fn api_list_handler(State(state): State<AppState>) -> Response {
    match with_store(&state, |store| store.summaries()).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => internal_error("Failed to list jobs", e),
    }
}

async fn api_job_handler(State(state): State<AppState>, UrlPath(name): UrlPath<String>) -> Response {
    if !is_valid_job_name(&name) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid job name".to_string(),
            }),
        )
            .into_response();
    }

    let lookup = name.clone();
    let found = with_store(&state, move |store| {
        Ok((store.status(&lookup)?, store.read_log(&lookup)?))
    })
    .await;

    match found {
        Ok((Some(status), log)) => Json(JobDetailResponse {
            submitted_at: crate::jobs::name::submitted_at(&name),
            name,
            status,
            log: log.unwrap_or_default(),
        })
        .into_response(),
        Ok((None, _)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Job not found: {}", name),
            }),
        )
            .into_response(),
        Err(e) => internal_error("Failed to read job", e),
    }
}
