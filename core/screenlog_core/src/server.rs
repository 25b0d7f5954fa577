//! HTTP backing store for the remote log sink, plus dashboard exports.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::export::{
    aggregate_screen_time, export_logs_as_csv, export_logs_as_json, filter_logs, LogFilter,
};
use crate::model::LogEntry;
use crate::store::{LogStore, SqliteLogStore};

#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<SqliteLogStore>>,
}

impl AppState {
    pub fn new(store: SqliteLogStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

fn err_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrResponse { ok: false, error })).into_response()
}

/// Accepts the sink body (`screenName`) as well as stored entries (`screen`).
#[derive(Deserialize)]
struct IngestEntry {
    #[serde(rename = "screenName", alias = "screen")]
    screen_name: String,
    timestamp: String,
    #[serde(default)]
    duration: u64,
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ClearResult {
    cleared: bool,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/api/screen-logs", get(get_users))
        .route(
            "/api/screen-logs/:user_id",
            get(get_logs)
                .post(post_log)
                .delete(delete_logs)
                .options(options_ok),
        )
        .route("/api/screen-logs/:user_id/totals", get(get_totals))
        .route("/api/screen-logs/:user_id/export/csv", get(get_export_csv))
        .route("/api/screen-logs/:user_id/export/json", get(get_export_json))
        .with_state(state)
        .layer(cors)
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "screenlog_core",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

async fn post_log(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    let e: IngestEntry = match serde_json::from_value(payload) {
        Ok(v) => v,
        Err(_) => return err_response(StatusCode::BAD_REQUEST, "invalid_json"),
    };
    if e.screen_name.trim().is_empty() {
        return err_response(StatusCode::BAD_REQUEST, "missing_screen");
    }
    // Stored as sent, but it must parse.
    if DateTime::parse_from_rfc3339(&e.timestamp).is_err() {
        return err_response(StatusCode::BAD_REQUEST, "invalid_ts");
    }

    let entry = LogEntry {
        screen: e.screen_name,
        duration: e.duration,
        timestamp: e.timestamp,
    };
    if let Err(err) = state.store.lock().await.append(&user_id, &entry) {
        error!("append for user {user_id} failed: {err}");
        return err_response(StatusCode::INTERNAL_SERVER_ERROR, "db_error");
    }
    info!(
        "user {user_id}: {} for {}s at {}",
        entry.screen, entry.duration, entry.timestamp
    );
    Json(OkResponse::<Value> { ok: true, data: None }).into_response()
}

async fn filtered_logs(
    state: &AppState,
    user_id: &str,
    q: &LogFilter,
) -> Result<Vec<LogEntry>, Response> {
    if let Some(date) = q.date.as_deref().filter(|d| !d.is_empty()) {
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(err_response(StatusCode::BAD_REQUEST, "invalid_date"));
        }
    }
    let logs = state.store.lock().await.read_all(user_id);
    Ok(filter_logs(&logs, q))
}

async fn get_users(State(state): State<AppState>) -> Response {
    match state.store.lock().await.users() {
        Ok(users) => Json(OkResponse {
            ok: true,
            data: Some(users),
        })
        .into_response(),
        Err(err) => {
            error!("users failed: {err}");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}

/// Plain JSON array so dashboard clients can check `Array.isArray`.
async fn get_logs(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(q): Query<LogFilter>,
) -> Response {
    match filtered_logs(&state, &user_id, &q).await {
        Ok(logs) => Json(logs).into_response(),
        Err(resp) => resp,
    }
}

async fn get_totals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(q): Query<LogFilter>,
) -> Response {
    match filtered_logs(&state, &user_id, &q).await {
        Ok(logs) => Json(OkResponse {
            ok: true,
            data: Some(aggregate_screen_time(&logs)),
        })
        .into_response(),
        Err(resp) => resp,
    }
}

async fn get_export_csv(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(q): Query<LogFilter>,
) -> Response {
    match filtered_logs(&state, &user_id, &q).await {
        Ok(logs) => (
            StatusCode::OK,
            [("content-type", "text/csv; charset=utf-8")],
            export_logs_as_csv(&logs),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

async fn get_export_json(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(q): Query<LogFilter>,
) -> Response {
    match filtered_logs(&state, &user_id, &q).await {
        Ok(logs) => (
            StatusCode::OK,
            [("content-type", "application/json; charset=utf-8")],
            export_logs_as_json(&logs),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

async fn delete_logs(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    match state.store.lock().await.clear(&user_id) {
        Ok(cleared) => Json(OkResponse {
            ok: true,
            data: Some(ClearResult { cleared }),
        })
        .into_response(),
        Err(err) => {
            error!("clear for user {user_id} failed: {err}");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
        }
    }
}
