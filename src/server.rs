//! HTTP transport.
//!
//! Routes:
//! - `POST /hash`      - form body `password=<secret>[&salt=yes]`, answers the job id
//! - `GET  /hash/{id}` - base64url digest of a finished job
//! - `GET  /stats`     - `{"total": n, "average": ms}` over the `/hash` requests
//!
//! The listener keeps serving while a shutdown drains (new submissions get
//! `503`) and stops once the service's transport-stop signal fires.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::FormRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::jobs::SubmitOptions;
use crate::service::HashService;
use crate::stats::StatsSnapshot;

/// Length of a hyphenated UUID such as `5b0e7a5e-8a5d-4c55-9d3c-0f8f1a2b3c4d`.
const HYPHENATED_ID_LEN: usize = 36;

/// Form fields accepted by `POST /hash`.
#[derive(Debug, Default, Deserialize)]
pub struct HashForm {
    /// The secret to digest.
    pub password: Option<String>,
    /// `yes` requests a salted digest.
    pub salt: Option<String>,
}

impl HashForm {
    fn options(&self) -> SubmitOptions {
        SubmitOptions {
            add_salt: self.salt.as_deref() == Some("yes"),
        }
    }
}

/// Failures mapped to HTTP responses.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Unavailable,
    NotFound,
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::BadRequest(msg),
            ServiceError::ServiceUnavailable => Self::Unavailable,
            ServiceError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service shutdown pending".to_string(),
            ),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::Internal(msg) => {
                log::error!("Request failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, format!("Error: {message}\n")).into_response()
    }
}

/// Build the router for `service`.
pub fn build_router(service: Arc<HashService>) -> Router {
    Router::new()
        .route("/hash", post(submit_hash))
        .route("/hash/{id}", get(lookup_hash))
        .route("/stats", get(stats))
        .with_state(service)
}

/// Serve HTTP on `listener` until the service's drain completes.
///
/// # Errors
///
/// Returns an I/O error if the server fails while accepting connections.
pub async fn serve(service: Arc<HashService>, listener: TcpListener) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening on http://{}", addr);
    }
    let router = build_router(Arc::clone(&service));
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { service.transport_stopped().await })
        .await?;
    log::info!("HTTP listener stopped");
    Ok(())
}

async fn submit_hash(
    State(service): State<Arc<HashService>>,
    form: Result<Form<HashForm>, FormRejection>,
) -> Result<String, ApiError> {
    let started = Instant::now();
    let result = submit_form(&service, form);
    service.stats().record_since(started);
    result
}

fn submit_form(
    service: &HashService,
    form: Result<Form<HashForm>, FormRejection>,
) -> Result<String, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let password = form.password.as_deref().unwrap_or_default();
    let job_id = service.submit(password.as_bytes(), form.options())?;
    Ok(format!("{job_id}\n"))
}

async fn lookup_hash(
    State(service): State<Arc<HashService>>,
    Path(id): Path<String>,
) -> Result<String, ApiError> {
    let started = Instant::now();
    let result = lookup_id(&service, &id);
    service.stats().record_since(started);
    result
}

fn lookup_id(service: &HashService, id: &str) -> Result<String, ApiError> {
    let invalid = || ApiError::BadRequest(format!("invalid job id '{id}'"));
    // Only the hyphenated form that submissions hand out is accepted.
    if id.len() != HYPHENATED_ID_LEN {
        return Err(invalid());
    }
    let job_id = Uuid::parse_str(id).map_err(|_| invalid())?;
    match service.get(&job_id.to_string())? {
        Some(record) => Ok(format!("{}\n", record.encoded_digest())),
        None => Err(ApiError::NotFound),
    }
}

async fn stats(State(service): State<Arc<HashService>>) -> Json<StatsSnapshot> {
    Json(service.stats().snapshot())
}
