//! Operator surface of the worker: liveness and the state of the last batch.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

/// Request ID stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMeta {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusData {
    last_task: Option<TaskItem>,
    global_stats: Option<GlobalStatsItem>,
}

#[derive(Debug, Serialize)]
struct TaskItem {
    task_id: Uuid,
    stage: String,
    success: Option<bool>,
    profiles_total: i32,
    profiles_failed: i32,
    posts_created: i32,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<venue_db::DataUpdateTaskRow> for TaskItem {
    fn from(row: venue_db::DataUpdateTaskRow) -> Self {
        Self {
            task_id: row.public_id,
            stage: row.stage,
            success: row.success,
            profiles_total: row.profiles_total,
            profiles_failed: row.profiles_failed,
            posts_created: row.posts_created,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct GlobalStatsItem {
    total_posts: i64,
    credited_posts: i64,
    total_points: Decimal,
    active_profiles: i64,
    captured_at: DateTime<Utc>,
}

impl From<venue_db::GlobalStatsRow> for GlobalStatsItem {
    fn from(row: venue_db::GlobalStatsRow) -> Self {
        Self {
            total_posts: row.total_posts,
            credited_posts: row.credited_posts,
            total_points: row.total_points,
            active_profiles: row.active_profiles,
            captured_at: row.created_at,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }
    res
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match venue_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

async fn status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Response {
    let last_task = venue_db::list_data_update_tasks(&state.pool, 1).await;
    let global_stats = venue_db::latest_global_stats(&state.pool).await;

    match (last_task, global_stats) {
        (Ok(tasks), Ok(stats)) => Json(ApiResponse {
            data: StatusData {
                last_task: tasks.into_iter().next().map(TaskItem::from),
                global_stats: stats.map(GlobalStatsItem::from),
            },
            meta: ResponseMeta::new(req_id.0),
        })
        .into_response(),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "status: database query failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
