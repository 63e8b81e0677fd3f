//! HTTP JSON facade: a loopback-only projection of every `Store` operation.
//!
//! No business logic lives here beyond parameter binding and the implicit
//! `CreateSession` every write performs on its body's session id. Handlers
//! translate [`crate::Error`] into HTTP status codes and hand everything
//! else straight to the store.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::observability::PrometheusHandle;
use crate::storage::{NewObservation, NewPrompt, SearchFilter, Store};
use crate::{Error, Result};

/// Project name recorded when an implicit `CreateSession` has no project to
/// work from, so `Stats().projects` never carries a bare empty string.
const IMPLICIT_PROJECT: &str = "unspecified";
/// Directory recorded when an implicit `CreateSession` has no working
/// directory to work from — neither the observation nor the prompt body
/// carries one.
const IMPLICIT_DIRECTORY: &str = "(unknown)";

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Storage { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the router, wiring every handler against a shared store. When
/// `metrics` is `Some`, also exposes `/metrics` in Prometheus text format.
#[must_use]
pub fn router(store: Arc<Store>, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session).get(recent_sessions))
        .route("/sessions/{id}/end", post(end_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/observations", get(session_observations))
        .route("/observations", post(add_observation).get(recent_observations))
        .route("/observations/{id}", get(get_observation))
        .route("/prompts", post(add_prompt).get(recent_prompts))
        .route("/context", get(context))
        .route("/search", get(search))
        .route("/search/prompts", get(search_prompts))
        .route("/timeline/{id}", get(timeline))
        .route("/stats", get(stats));

    if let Some(handle) = metrics {
        router = router.route("/metrics", get(move || async move { handle.render() }));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// Binds and serves the HTTP facade until the process is signaled to stop.
///
/// # Errors
///
/// Returns [`Error::Io`] if the port cannot be bound.
pub async fn serve(store: Arc<Store>, port: u16, metrics: Option<PrometheusHandle>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "http facade listening");
    axum::serve(listener, router(store, metrics))
        .await
        .map_err(|e| Error::Storage {
            operation: "http_serve".to_string(),
            cause: e.to_string(),
        })
}

async fn health(State(store): State<Arc<Store>>) -> Json<serde_json::Value> {
    let db_ok = store.stats().is_ok();
    Json(json!({ "status": "ok", "db_reachable": db_ok }))
}

#[derive(Debug, Deserialize)]
struct CreateSessionBody {
    id: String,
    project: String,
    directory: String,
}

async fn create_session(
    State(store): State<Arc<Store>>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<crate::storage::Session>> {
    store.create_session(&body.id, &body.project, &body.directory)?;
    Ok(Json(store.get_session(&body.id)?))
}

#[derive(Debug, Deserialize)]
struct EndSessionBody {
    #[serde(default)]
    summary: String,
}

async fn end_session(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
    Json(body): Json<EndSessionBody>,
) -> Result<Json<crate::storage::Session>> {
    store.end_session(&id, &body.summary)?;
    Ok(Json(store.get_session(&id)?))
}

async fn get_session(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
) -> Result<Json<crate::storage::Session>> {
    Ok(Json(store.get_session(&id)?))
}

async fn recent_sessions(
    State(store): State<Arc<Store>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<crate::storage::Session>>> {
    let project = params.get("project").map(String::as_str);
    let limit = parse_limit(&params, 20);
    Ok(Json(store.recent_sessions(project, limit)?))
}

async fn session_observations(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<crate::storage::Observation>>> {
    let limit = parse_limit(&params, 50);
    Ok(Json(store.session_observations(&id, limit)?))
}

#[derive(Debug, Deserialize)]
struct ObservationBody {
    session_id: String,
    r#type: String,
    title: String,
    content: String,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    project: Option<String>,
}

#[derive(Debug, Serialize)]
struct IdResponse {
    id: i64,
}

async fn add_observation(
    State(store): State<Arc<Store>>,
    Json(body): Json<ObservationBody>,
) -> Result<Json<IdResponse>> {
    store.create_session(
        &body.session_id,
        body.project.as_deref().unwrap_or(IMPLICIT_PROJECT),
        IMPLICIT_DIRECTORY,
    )?;
    let id = store.add_observation(NewObservation {
        session_id: body.session_id,
        r#type: body.r#type,
        title: body.title,
        content: body.content,
        tool_name: body.tool_name,
        project: body.project,
    })?;
    Ok(Json(IdResponse { id }))
}

async fn get_observation(
    State(store): State<Arc<Store>>,
    Path(id): Path<i64>,
) -> Result<Json<crate::storage::Observation>> {
    Ok(Json(store.get_observation(id)?))
}

async fn recent_observations(
    State(store): State<Arc<Store>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<crate::storage::Observation>>> {
    let project = params.get("project").map(String::as_str);
    let limit = parse_limit(&params, 20);
    Ok(Json(store.recent_observations(project, limit)?))
}

#[derive(Debug, Deserialize)]
struct PromptBody {
    session_id: String,
    content: String,
    #[serde(default)]
    project: Option<String>,
}

async fn add_prompt(
    State(store): State<Arc<Store>>,
    Json(body): Json<PromptBody>,
) -> Result<Json<IdResponse>> {
    store.create_session(
        &body.session_id,
        body.project.as_deref().unwrap_or(IMPLICIT_PROJECT),
        IMPLICIT_DIRECTORY,
    )?;
    let id = store.add_prompt(NewPrompt {
        session_id: body.session_id,
        content: body.content,
        project: body.project,
    })?;
    Ok(Json(IdResponse { id }))
}

async fn recent_prompts(
    State(store): State<Arc<Store>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<crate::storage::Prompt>>> {
    let project = params.get("project").map(String::as_str);
    let limit = parse_limit(&params, 20);
    Ok(Json(store.recent_prompts(project, limit)?))
}

#[derive(Debug, Serialize, Deserialize)]
struct ContextResponse {
    context: String,
}

async fn context(
    State(store): State<Arc<Store>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ContextResponse>> {
    let project = params.get("project").map(String::as_str);
    Ok(Json(ContextResponse {
        context: store.format_context(project)?,
    }))
}

async fn search(
    State(store): State<Arc<Store>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<crate::storage::Observation>>> {
    let query = params.get("q").cloned().unwrap_or_default();
    let filter = SearchFilter {
        r#type: params.get("type").cloned(),
        project: params.get("project").cloned(),
        limit: params.get("limit").and_then(|v| v.parse().ok()),
    };
    Ok(Json(store.search(&query, &filter)?))
}

async fn search_prompts(
    State(store): State<Arc<Store>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<crate::storage::Prompt>>> {
    let query = params.get("q").cloned().unwrap_or_default();
    let filter = SearchFilter {
        r#type: None,
        project: params.get("project").cloned(),
        limit: params.get("limit").and_then(|v| v.parse().ok()),
    };
    Ok(Json(store.search_prompts(&query, &filter)?))
}

async fn timeline(
    State(store): State<Arc<Store>>,
    Path(id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<crate::storage::TimelineResult>> {
    let before = params.get("before").and_then(|v| v.parse().ok()).unwrap_or(0usize);
    let after = params.get("after").and_then(|v| v.parse().ok()).unwrap_or(0usize);
    Ok(Json(store.timeline(id, before, after)?))
}

async fn stats(State(store): State<Arc<Store>>) -> Result<Json<crate::storage::Stats>> {
    Ok(Json(store.stats()?))
}

fn parse_limit(params: &HashMap<String, String>, default: usize) -> usize {
    params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
