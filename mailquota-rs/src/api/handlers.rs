//! API request handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use tracing::{error, warn};

use crate::batch::{resolve_batch, AccountRequest, BatchEntry};
use crate::error::{Result, UsageError};
use crate::resolver::{UsageResolver, UsageResult};
use crate::transport::{ConnectionParameters, MailTransport};

/// Routes listed in the 404 response
pub const AVAILABLE_ENDPOINTS: &[&str] = &[
    "GET /health",
    "GET /mailbox",
    "POST /mailbox",
    "POST /mailbox/batch",
];

const MANUAL_NOTE: &str = "Size limit not available via IMAP";

/// Shared application state
pub struct AppState<T> {
    pub resolver: Arc<UsageResolver<T>>,
    /// Account served by `GET /mailbox`
    pub default_account: Option<ConnectionParameters>,
    pub batch_concurrency: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Failure response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
}

impl ApiError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}

/// Quota figures as returned to callers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaData {
    #[serde(rename = "usedMB")]
    pub used_mb: f64,
    #[serde(rename = "limitMB")]
    pub limit_mb: f64,
    pub percent_used: f64,
    #[serde(rename = "availableMB")]
    pub available_mb: f64,
}

/// Computed size as returned to callers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualData {
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
    pub message_count: u32,
    pub note: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum UsageData {
    Quota(QuotaData),
    Manual(ManualData),
}

impl From<&UsageResult> for UsageData {
    fn from(result: &UsageResult) -> Self {
        match result {
            UsageResult::Quota(quota) => UsageData::Quota(QuotaData {
                used_mb: quota.used_mb,
                limit_mb: quota.limit_mb,
                percent_used: quota.percent_used,
                available_mb: quota.available_mb,
            }),
            UsageResult::Manual(manual) => UsageData::Manual(ManualData {
                total_size_mb: manual.total_size_mb,
                message_count: manual.message_count,
                note: MANUAL_NOTE,
            }),
        }
    }
}

/// Successful mailbox check
#[derive(Debug, Serialize)]
pub struct MailboxResponse {
    pub success: bool,
    #[serde(flatten)]
    pub usage: UsageData,
}

impl From<&UsageResult> for MailboxResponse {
    fn from(result: &UsageResult) -> Self {
        Self {
            success: true,
            usage: result.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Success(MailboxResponse),
    Failure(ApiError),
}

/// One entry of the batch response
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub account: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl From<BatchEntry> for BatchResult {
    fn from(entry: BatchEntry) -> Self {
        let outcome = match entry.result {
            Ok(ref usage) => BatchOutcome::Success(usage.into()),
            Err(error) => BatchOutcome::Failure(ApiError::new(error)),
        };
        Self {
            account: entry.account,
            outcome,
        }
    }
}

/// Batch response body
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchResult>,
}

fn usage_response(result: Result<UsageResult>) -> Response {
    match result {
        Ok(usage) => (StatusCode::OK, Json(MailboxResponse::from(&usage))).into_response(),
        Err(e) => {
            error!("Mailbox check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiError::new(e.to_string()))).into_response()
        }
    }
}

/// Unwrap a JSON body. A request without a JSON content type counts as an
/// empty body; an unreadable one is answered with a 500.
fn json_body(body: std::result::Result<Json<Value>, JsonRejection>) -> std::result::Result<Value, Response> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(Value::Null),
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection);
            Err(internal_error())
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new("Internal server error")),
    )
        .into_response()
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    })
}

/// GET /mailbox - Check the configured default account
pub async fn get_mailbox<T: MailTransport + 'static>(State(state): State<Arc<AppState<T>>>) -> Response {
    let Some(ref params) = state.default_account else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "IMAP configuration not set",
                "message": "Please configure IMAP credentials via environment variables or POST request"
            })),
        )
            .into_response();
    };

    usage_response(state.resolver.clone().resolve_detached(params.clone()).await)
}

/// POST /mailbox - Check the account given in the body
pub async fn post_mailbox<T: MailTransport + 'static>(
    State(state): State<Arc<AppState<T>>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let params = match AccountRequest::from_json(&body).into_params() {
        Ok(params) => params,
        Err(UsageError::MissingFields) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Missing required fields",
                    "required": ["user", "password", "host"]
                })),
            )
                .into_response()
        }
        Err(e) => return usage_response(Err(e)),
    };

    usage_response(state.resolver.clone().resolve_detached(params).await)
}

/// POST /mailbox/batch - Check several accounts
pub async fn post_batch<T: MailTransport + 'static>(
    State(state): State<Arc<AppState<T>>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let Some(accounts) = body.get("accounts").and_then(Value::as_array) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid request",
                "message": "Expected { accounts: [...] }"
            })),
        )
            .into_response();
    };

    let accounts: Vec<AccountRequest> = accounts
        .iter()
        .map(AccountRequest::from_json)
        .collect();

    let entries = resolve_batch(state.resolver.clone(), accounts, state.batch_concurrency).await;

    Json(BatchResponse {
        results: entries.into_iter().map(BatchResult::from).collect(),
    })
    .into_response()
}

/// Fallback for unknown routes
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "availableEndpoints": AVAILABLE_ENDPOINTS
        })),
    )
        .into_response()
}

/// Turn a handler panic into a JSON 500
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);

    internal_error()
}
