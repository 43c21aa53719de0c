//! Resource handlers for the public API
//!
//! All four resource endpoints reply HTTP 200 with a body-level status
//! code, matching the contract the service has always had: transport
//! success, application status in the JSON. Classify is the exception on
//! the success path — it returns the label → confidence mapping directly.

use std::sync::atomic::Ordering;
use std::time::Instant;

use accounts::AuthError;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::AppState;
use crate::metrics::{self, ServiceMetrics};

/// Request body for register and login.
#[derive(Deserialize)]
pub struct CredentialRequest {
    pub username: String,
    pub password: String,
}

/// Request body for classify.
#[derive(Deserialize)]
pub struct ClassifyRequest {
    pub username: String,
    pub password: String,
    pub url: String,
}

/// Build the `{status, msg}` JSON reply carried on HTTP 200.
pub fn api_message(status: u16, msg: &str) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": status, "msg": msg })),
    )
        .into_response()
}

/// Count and time a finished request.
fn finish(service_metrics: &ServiceMetrics, endpoint: &str, status: u16, started: Instant) {
    if status >= 500 {
        service_metrics.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    metrics::record_request(endpoint, status, started.elapsed().as_secs_f64());
}

/// POST /v1/register — create a user with the starting token balance.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<CredentialRequest>,
) -> Response {
    let started = Instant::now();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let (status, msg) = match state
        .credentials
        .register(&body.username, &body.password)
        .await
    {
        Ok(()) => (200, "You successfully signed up for the API"),
        Err(AuthError::AlreadyExists) => (301, "User already exists"),
        Err(e) => {
            error!(username = %body.username, error = %e, "registration failed");
            (500, "Internal error")
        }
    };

    finish(&state.metrics, "register", status, started);
    api_message(status, msg)
}

/// POST /v1/login — verify a credential pair.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<CredentialRequest>,
) -> Response {
    let started = Instant::now();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

    let (status, msg) = match state
        .credentials
        .verify(&body.username, &body.password)
        .await
    {
        Ok(()) => (200, "Login successful"),
        Err(AuthError::InvalidUsername) => (301, "Invalid Username"),
        Err(AuthError::InvalidPassword) => (302, "Invalid Password"),
        Err(e) => {
            error!(username = %body.username, error = %e, "login check failed");
            (500, "Internal error")
        }
    };

    finish(&state.metrics, "login", status, started);
    api_message(status, msg)
}

/// POST /v1/classify — fetch, classify, and charge one token.
///
/// Success returns the label → confidence mapping; every abort returns
/// `{status, msg}` and leaves the ledger untouched.
pub async fn classify_handler(
    State(state): State<AppState>,
    Json(body): Json<ClassifyRequest>,
) -> Response {
    let started = Instant::now();
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());

    match state
        .coordinator
        .classify(&body.username, &body.password, &body.url)
        .await
    {
        Ok(predictions) => {
            info!(
                request_id,
                username = %body.username,
                labels = predictions.len(),
                "classification served"
            );
            finish(&state.metrics, "classify", 200, started);

            let mut map = serde_json::Map::new();
            for p in predictions {
                map.insert(p.label, serde_json::json!(p.confidence));
            }
            (StatusCode::OK, Json(serde_json::Value::Object(map))).into_response()
        }
        Err(failure) => {
            warn!(
                request_id,
                username = %body.username,
                stage = failure.stage(),
                error = %failure,
                "classification aborted"
            );
            metrics::record_pipeline_failure(failure.stage());
            let status = failure.status();
            finish(&state.metrics, "classify", status, started);
            api_message(status, failure.message())
        }
    }
}
