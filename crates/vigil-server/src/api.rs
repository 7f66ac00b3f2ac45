use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use vigil_common::types::AlertStatus;
use vigil_storage::{AlertFilter, StoreError};

use crate::logging::TraceId;
use crate::state::AppState;

/// Unified response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// Error code (0 on success).
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
    pub data: Option<T>,
}

#[derive(Serialize)]
pub struct PaginatedData<T>
where
    T: Serialize,
{
    pub items: Vec<T>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

fn resolve_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

pub fn success_response<T>(status: StatusCode, trace_id: &str, data: T) -> Response
where
    T: Serialize,
{
    (
        status,
        Json(ApiResponse {
            err_code: 0,
            err_msg: "success".to_string(),
            trace_id: trace_id.to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

pub fn success_empty_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: 0,
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "not_found" => 1004,
        "conflict" => 1005,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

fn store_error_response(trace_id: &str, e: StoreError) -> Response {
    if !e.is_client_error() {
        tracing::error!(error = %e, "Storage failure");
    }
    match &e {
        StoreError::NotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, trace_id, "not_found", &e.to_string())
        }
        StoreError::InvalidTransition { .. } => {
            error_response(StatusCode::CONFLICT, trace_id, "conflict", &e.to_string())
        }
        _ => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            trace_id,
            "storage_error",
            "Database error",
        ),
    }
}

/// Accepts either a plain date (`2026-08-27`) or a full RFC3339 timestamp.
/// Plain dates snap to the start or end of the day depending on which side
/// of the range they bound.
fn parse_date_param(raw: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)?
    } else {
        date.and_hms_opt(0, 0, 0)?
    };
    Some(time.and_utc())
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/history", get(alerts_history))
        .route("/api/alerts/:id", get(get_alert))
        .route("/api/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/alerts/:id/resolve", post(resolve_alert))
        .route("/api/alerts/:id/history", get(alert_history))
        .route("/api/alerts/:id/acknowledgments", get(list_acknowledgments))
}

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
    database: String,
}

async fn health(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let database = match state.store.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Database ping failed");
            "unavailable".to_string()
        }
    };
    success_response(
        StatusCode::OK,
        &trace_id,
        HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (Utc::now() - state.start_time).num_seconds(),
            database,
        },
    )
}

async fn status(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let connection = state.orchestrator.connection_status();
    let metrics = state.orchestrator.metrics_snapshot();
    success_response(
        StatusCode::OK,
        &trace_id,
        json!({
            "poller_enabled": state.poller_enabled,
            "connection": connection,
            "metrics": metrics,
            "broadcast_subscribers": state.bus.subscriber_count(),
        }),
    )
}

#[derive(Debug, Deserialize)]
struct ListAlertsParams {
    status: Option<String>,
    severity: Option<i32>,
    host: Option<String>,
    search: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListAlertsParams>,
) -> impl IntoResponse {
    let status_eq = match params.status.as_deref() {
        Some(raw) => match raw.parse::<AlertStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "bad_request",
                    &format!("Unknown status '{raw}'"),
                );
            }
        },
        None => None,
    };
    if let Some(severity) = params.severity {
        if !(0..=5).contains(&severity) {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                "Severity must be between 0 and 5",
            );
        }
    }

    let filter = AlertFilter {
        status_eq,
        severity_eq: params.severity,
        host_contains: params.host,
        name_contains: params.search,
    };
    let limit = resolve_limit(params.limit);
    let offset = params.offset.unwrap_or(0);

    match state.store.list_alerts(&filter, limit, offset).await {
        Ok((items, total)) => success_response(
            StatusCode::OK,
            &trace_id,
            PaginatedData {
                items,
                total,
                limit,
                offset,
            },
        ),
        Err(e) => store_error_response(&trace_id, e),
    }
}

#[derive(Debug, Deserialize)]
struct DateRangeParams {
    from: Option<String>,
    to: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn alerts_history(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<DateRangeParams>,
) -> impl IntoResponse {
    let from = match &params.from {
        Some(raw) => match parse_date_param(raw, false) {
            Some(ts) => ts,
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "bad_request",
                    &format!("Invalid date '{raw}'"),
                );
            }
        },
        None => Utc::now() - chrono::Duration::days(7),
    };
    let to = match &params.to {
        Some(raw) => match parse_date_param(raw, true) {
            Some(ts) => ts,
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "bad_request",
                    &format!("Invalid date '{raw}'"),
                );
            }
        },
        None => Utc::now(),
    };
    if from > to {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "'from' must not be after 'to'",
        );
    }

    let limit = resolve_limit(params.limit);
    let offset = params.offset.unwrap_or(0);
    match state.store.alerts_in_range(from, to, limit, offset).await {
        Ok((items, total)) => success_response(
            StatusCode::OK,
            &trace_id,
            PaginatedData {
                items,
                total,
                limit,
                offset,
            },
        ),
        Err(e) => store_error_response(&trace_id, e),
    }
}

async fn get_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_alert(&id).await {
        Ok(Some(alert)) => success_response(StatusCode::OK, &trace_id, alert),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Alert not found",
        ),
        Err(e) => store_error_response(&trace_id, e),
    }
}

#[derive(Debug, Deserialize)]
struct AcknowledgeRequest {
    operator_name: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn acknowledge_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AcknowledgeRequest>,
) -> impl IntoResponse {
    let operator = req.operator_name.trim();
    if operator.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "operator_name is required",
        );
    }
    match state
        .orchestrator
        .acknowledge_alert(&id, operator, req.reason.as_deref())
        .await
    {
        Ok((alert, ack)) => success_response(
            StatusCode::OK,
            &trace_id,
            json!({ "alert": alert, "acknowledgment": ack }),
        ),
        Err(e) => store_error_response(&trace_id, e),
    }
}

#[derive(Debug, Deserialize, Default)]
struct ResolveRequest {
    #[serde(default)]
    actor: Option<String>,
}

async fn resolve_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Option<Json<ResolveRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let actor = req.actor.as_deref().unwrap_or("operator");
    match state.orchestrator.resolve_alert(&id, actor).await {
        Ok(Some(alert)) => success_response(StatusCode::OK, &trace_id, alert),
        Ok(None) => success_empty_response(StatusCode::OK, &trace_id, "Alert already resolved"),
        Err(e) => store_error_response(&trace_id, e),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    from: Option<String>,
    to: Option<String>,
}

async fn alert_history(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let from = params.from.as_deref().and_then(|raw| parse_date_param(raw, false));
    let to = params.to.as_deref().and_then(|raw| parse_date_param(raw, true));
    match state.store.alert_history(&id, from, to).await {
        Ok(entries) => success_response(StatusCode::OK, &trace_id, entries),
        Err(e) => store_error_response(&trace_id, e),
    }
}

async fn list_acknowledgments(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.list_acknowledgments(&id).await {
        Ok(acks) => success_response(StatusCode::OK, &trace_id, acks),
        Err(e) => store_error_response(&trace_id, e),
    }
}
