use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use sitesearch_crawler::{ControlError, Controller};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub site: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct IndexPageParams {
    #[serde(default)]
    pub url: String,
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub admin_token: Option<String>,
}

/// `{"result": false, "error": ...}` with a matching status code.
pub struct ApiError(StatusCode, String);

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        let status = match &e {
            ControlError::Internal(err) => {
                tracing::error!(error = %err, "command failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "result": false, "error": self.1 }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// Router over `controller`, taking the admin token from `ADMIN_TOKEN`.
pub fn build_app(controller: Arc<Controller>) -> Router {
    router(controller, std::env::var("ADMIN_TOKEN").ok())
}

pub fn router(controller: Arc<Controller>, admin_token: Option<String>) -> Router {
    let state = AppState { controller, admin_token };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let origins: Vec<_> = std::env::var("CORS_ALLOW_ORIGIN")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/startIndexing", get(start_indexing))
        .route("/api/stopIndexing", get(stop_indexing))
        .route("/api/indexPage", post(index_page))
        .route("/api/search", get(search))
        .route("/api/statistics", get(statistics))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn start_indexing(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers)?;
    state.controller.start_indexing().await?;
    Ok(Json(json!({ "result": true })))
}

async fn stop_indexing(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers)?;
    state.controller.stop_indexing().await?;
    Ok(Json(json!({ "result": true })))
}

async fn index_page(State(state): State<AppState>, headers: HeaderMap, Query(params): Query<IndexPageParams>) -> ApiResult {
    authorize(&state, &headers)?;
    let task = state.controller.index_page(&params.url)?;
    let url = params.url;
    tokio::spawn(async move {
        match task.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(%url, error = %e, "page re-index failed"),
            Err(e) => tracing::warn!(%url, error = %e, "page re-index panicked"),
        }
    });
    Ok(Json(json!({ "result": true })))
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult {
    let controller = state.controller.clone();
    let response = tokio::task::spawn_blocking(move || {
        controller.search(&params.query, params.site.as_deref(), params.offset, params.limit)
    })
    .await
    .map_err(|e| ControlError::Internal(e.into()))??;
    Ok(Json(json!(response)))
}

async fn statistics(State(state): State<AppState>) -> ApiResult {
    let stats = state.controller.statistics()?;
    Ok(Json(json!({ "result": true, "statistics": stats })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(required) = &state.admin_token else {
        return Ok(());
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError(StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
