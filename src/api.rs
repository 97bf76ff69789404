//! REST endpoints for creating, inspecting and cancelling translation tasks.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::ratelimit::RateLimiter;
use crate::store::TaskStore;
use crate::translation::{SUPPORTED_LANGUAGES, TaskKind, TaskStatus, TranslationQueue, TranslationTask};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub queue: TranslationQueue,
    /// Model fallback order, exposed to clients for model pickers.
    pub models: Vec<String>,
    pub limiter: RateLimiter,
    /// Poll period of `/api/translations/{id}/progress`.
    pub progress_interval: Duration,
}

/// Build the HTTP router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/translations", post(create_translation))
        .route(
            "/api/translations/{id}",
            get(get_translation).delete(cancel_translation),
        )
        .route("/api/translations/{id}/progress", get(translation_progress))
        .route("/api/settings/usage", get(get_usage))
        .route("/api/jobs", get(list_jobs))
        .route("/api/constants/languages", get(list_languages))
        .route("/api/constants/models", get(list_models))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into()}))).into_response()
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error!(error = %e, "Request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn parse_task_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid task ID"))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "github-global"
    }))
}

// ── Translations ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateTranslationRequest {
    user_id: Option<String>,
    repository_id: Option<String>,
    #[serde(default)]
    target_languages: Vec<String>,
    #[serde(default)]
    kind: TaskKind,
    #[serde(default)]
    changed_files: Vec<String>,
    #[serde(default = "default_base_language")]
    base_language: String,
    preferred_model: Option<String>,
}

fn default_base_language() -> String {
    "en".into()
}

async fn create_translation(
    State(state): State<AppState>,
    Json(body): Json<CreateTranslationRequest>,
) -> Response {
    let repository_id = body.repository_id.filter(|r| !r.trim().is_empty());
    let languages: Vec<String> = body
        .target_languages
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let (Some(repository_id), false) = (repository_id, languages.is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "repository_id and target_languages are required",
        );
    };
    let Some(user_id) = body.user_id.filter(|u| !u.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "user_id is required");
    };

    match state.limiter.try_acquire(&user_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(user_id = %user_id, "Daily task limit reached");
            return error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Daily limit exceeded. Please try again tomorrow or add your own API key.",
            );
        }
        Err(e) => return internal_error(e),
    }

    let mut task = TranslationTask::new(user_id, repository_id, languages)
        .with_base_language(body.base_language);
    if body.kind == TaskKind::Incremental {
        task = task.with_changed_files(body.changed_files);
    }
    if let Some(model) = body.preferred_model.filter(|m| !m.trim().is_empty()) {
        task = task.with_preferred_model(model);
    }

    if let Err(e) = state.store.create_task(&task).await {
        return internal_error(e);
    }
    let job_id = state.queue.add(task.job());

    info!(task_id = %task.id, job_id = %job_id, kind = ?task.kind, "Translation task queued");
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "task_id": task.id, "job_id": job_id})),
    )
        .into_response()
}

async fn get_translation(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let task = match state.store.get_task(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Task not found"),
        Err(e) => return internal_error(e),
    };
    match state.store.list_translated_files(task_id).await {
        Ok(files) => Json(json!({"task": task, "files": files})).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn cancel_translation(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let task = match state.store.get_task(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Task not found"),
        Err(e) => return internal_error(e),
    };

    if !matches!(task.status, TaskStatus::Pending | TaskStatus::Running) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Task is already {}", task.status),
        );
    }

    match state
        .store
        .update_task_status(task_id, TaskStatus::Cancelled, Some("Cancelled by user"))
        .await
    {
        Ok(TaskStatus::Cancelled) => {}
        // Finished between the read and the write.
        Ok(status) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Task is already {status}"));
        }
        Err(e) => return internal_error(e),
    }
    info!(task_id = %task_id, "Translation task cancelled");
    Json(json!({"success": true, "status": TaskStatus::Cancelled})).into_response()
}

/// Snapshot sent on every progress tick. `None` once the task is gone.
async fn progress_snapshot(store: &dyn TaskStore, task_id: Uuid) -> Result<Option<(Value, bool)>, StoreError> {
    let Some(task) = store.get_task(task_id).await? else {
        return Ok(None);
    };
    let files = store.list_translated_files(task_id).await?;
    let snapshot = json!({
        "status": task.status,
        "progress": task.progress,
        "total_files": task.total_files,
        "completed_files": task.completed_files,
        "failed_files": task.failed_files,
        "error_message": task.error_message,
        "files": files,
    });
    Ok(Some((snapshot, task.status.is_terminal())))
}

struct ProgressPoll {
    store: Arc<dyn TaskStore>,
    task_id: Uuid,
    interval: Duration,
    first: bool,
    done: bool,
}

/// Server-sent `progress` events until the task reaches a terminal status.
fn progress_stream(poll: ProgressPoll) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(poll, |mut poll| async move {
        if poll.done {
            return None;
        }
        if !poll.first {
            tokio::time::sleep(poll.interval).await;
        }
        poll.first = false;

        let event = match progress_snapshot(poll.store.as_ref(), poll.task_id).await {
            Ok(Some((snapshot, terminal))) => {
                poll.done = terminal;
                Event::default().event("progress").data(snapshot.to_string())
            }
            Ok(None) => return None,
            Err(e) => {
                warn!(task_id = %poll.task_id, error = %e, "Progress poll failed");
                poll.done = true;
                Event::default()
                    .event("error")
                    .data(json!({"error": e.to_string()}).to_string())
            }
        };
        Some((Ok(event), poll))
    })
}

async fn translation_progress(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.get_task(task_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Task not found"),
        Err(e) => return internal_error(e),
    }

    let poll = ProgressPoll {
        store: state.store.clone(),
        task_id,
        interval: state.progress_interval,
        first: true,
        done: false,
    };
    Sse::new(progress_stream(poll))
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ── Usage ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UsageQuery {
    user_id: Option<String>,
}

async fn get_usage(State(state): State<AppState>, Query(query): Query<UsageQuery>) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "user_id is required");
    };
    match state.limiter.usage(&user_id).await {
        Ok(usage) => Json(json!({
            "today": {
                "date": usage.date,
                "count": usage.count,
                "limit": usage.limit,
            },
            "has_api_key": usage.has_api_key,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Introspection ───────────────────────────────────────────────────────

async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "running": state.queue.running_count(),
        "pending": state.queue.pending_count(),
        "jobs": state.queue.get_all_jobs(),
    }))
}

async fn list_languages() -> impl IntoResponse {
    Json(SUPPORTED_LANGUAGES)
}

async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "default": state.models.first(),
        "models": state.models,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;
    use crate::config::FreeTierLimits;
    use crate::store::InMemoryStore;
    use crate::translation::TaskSummary;

    fn test_state() -> (AppState, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let queue = TranslationQueue::new(1);
        queue.set_processor(|job| async move {
            Ok(TaskSummary {
                task_id: job.task_id,
                status: TaskStatus::Completed,
                total_files: 0,
                completed_files: 0,
                failed_files: 0,
                readme_updated: false,
            })
        });
        let limiter = RateLimiter::new(
            store.clone(),
            Some(FreeTierLimits {
                daily_tasks: 2,
                ..Default::default()
            }),
        );
        let state = AppState {
            store: store.clone(),
            queue,
            models: vec!["deepseek/deepseek-chat".into(), "qwen/qwen-turbo".into()],
            limiter,
            progress_interval: Duration::from_millis(10),
        };
        (state, store)
    }

    async fn send_raw(app: Router, uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn new_task_body(user_id: &str) -> Value {
        json!({"user_id": user_id, "repository_id": "repo", "target_languages": ["ja"]})
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_ok() {
        let (state, _) = test_state();
        let (status, body) = send(api_routes(state), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_requires_repository_and_languages() {
        let (state, _) = test_state();
        let (status, body) = send(
            api_routes(state.clone()),
            Method::POST,
            "/api/translations",
            Some(json!({"user_id": "alice", "target_languages": ["ja"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("repository_id"));

        let (status, _) = send(
            api_routes(state),
            Method::POST,
            "/api/translations",
            Some(json!({"user_id": "alice", "repository_id": "r", "target_languages": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_then_fetch_task() {
        let (state, store) = test_state();
        let (status, body) = send(
            api_routes(state.clone()),
            Method::POST,
            "/api/translations",
            Some(json!({
                "user_id": "alice",
                "repository_id": "repo",
                "target_languages": ["ja", "ko"],
                "kind": "incremental",
                "changed_files": ["README.md"],
                "preferred_model": "qwen/qwen-turbo"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);

        let task_id: Uuid = body["task_id"].as_str().unwrap().parse().unwrap();
        let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

        let stored = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(stored.kind, TaskKind::Incremental);
        assert_eq!(stored.preferred_model.as_deref(), Some("qwen/qwen-turbo"));

        let job = state.queue.wait(job_id).await.unwrap();
        assert_eq!(job.data.task_id, task_id);

        let (status, body) = send(
            api_routes(state),
            Method::GET,
            &format!("/api/translations/{task_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"]["repository_id"], "repo");
        assert!(body["files"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids() {
        let (state, _) = test_state();
        let (status, _) = send(
            api_routes(state.clone()),
            Method::GET,
            &format!("/api/translations/{}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(api_routes(state), Method::GET, "/api/translations/nope", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_only_active_tasks() {
        let (state, store) = test_state();
        let task = TranslationTask::new("alice", "repo", vec!["ja".into()]);
        store.create_task(&task).await.unwrap();
        let uri = format!("/api/translations/{}", task.id);

        let (status, body) = send(api_routes(state.clone()), Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");
        let stored = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);

        let (status, body) = send(api_routes(state), Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn cancel_does_not_reopen_finished_task() {
        let (state, store) = test_state();
        let task = TranslationTask::new("alice", "repo", vec!["ja".into()]);
        store.create_task(&task).await.unwrap();
        store
            .update_task_status(task.id, TaskStatus::Completed, None)
            .await
            .unwrap();

        let uri = format!("/api/translations/{}", task.id);
        let (status, body) = send(api_routes(state), Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("completed"));
        let stored = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn free_user_hits_daily_limit() {
        let (state, _) = test_state();
        for _ in 0..2 {
            let (status, _) = send(
                api_routes(state.clone()),
                Method::POST,
                "/api/translations",
                Some(new_task_body("alice")),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(
            api_routes(state.clone()),
            Method::POST,
            "/api/translations",
            Some(new_task_body("alice")),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"].as_str().unwrap().contains("Daily limit"));

        // Other users keep their own quota.
        let (status, _) = send(
            api_routes(state),
            Method::POST,
            "/api/translations",
            Some(new_task_body("bob")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn usage_reports_count_and_limit() {
        let (state, store) = test_state();
        send(
            api_routes(state.clone()),
            Method::POST,
            "/api/translations",
            Some(new_task_body("alice")),
        )
        .await;

        let (status, body) = send(
            api_routes(state.clone()),
            Method::GET,
            "/api/settings/usage?user_id=alice",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["today"]["count"], 1);
        assert_eq!(body["today"]["limit"], 2);
        assert_eq!(body["has_api_key"], false);

        store.set_api_key("carol", SecretString::from("sk-carol")).await;
        for _ in 0..3 {
            let (status, _) = send(
                api_routes(state.clone()),
                Method::POST,
                "/api/translations",
                Some(new_task_body("carol")),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (_, body) = send(
            api_routes(state.clone()),
            Method::GET,
            "/api/settings/usage?user_id=carol",
            None,
        )
        .await;
        assert_eq!(body["today"]["limit"], Value::Null);
        assert_eq!(body["has_api_key"], true);

        let (status, _) = send(api_routes(state), Method::GET, "/api/settings/usage", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn progress_streams_until_terminal() {
        let (state, store) = test_state();
        let task = TranslationTask::new("alice", "repo", vec!["ja".into()]);
        store.create_task(&task).await.unwrap();
        store
            .update_task_status(task.id, TaskStatus::Running, None)
            .await
            .unwrap();

        let finisher = store.clone();
        let task_id = task.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            finisher
                .update_task_status(task_id, TaskStatus::Completed, None)
                .await
                .unwrap();
        });

        let (status, body) = send_raw(
            api_routes(state.clone()),
            &format!("/api/translations/{}/progress", task.id),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let events: Vec<Value> = body
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .map(|d| serde_json::from_str(d).unwrap())
            .collect();
        assert!(events.len() >= 2);
        assert_eq!(events[0]["status"], "running");
        assert_eq!(events.last().unwrap()["status"], "completed");
        assert!(body.contains("event: progress"));

        let (status, _) = send_raw(
            api_routes(state),
            &format!("/api/translations/{}/progress", Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn constants_and_jobs() {
        let (state, _) = test_state();

        let (status, body) = send(api_routes(state.clone()), Method::GET, "/api/constants/languages", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), SUPPORTED_LANGUAGES.len());

        let (_, body) = send(api_routes(state.clone()), Method::GET, "/api/constants/models", None).await;
        assert_eq!(body["default"], "deepseek/deepseek-chat");
        assert_eq!(body["models"].as_array().unwrap().len(), 2);

        let (_, body) = send(api_routes(state), Method::GET, "/api/jobs", None).await;
        assert_eq!(body["running"], 0);
        assert!(body["jobs"].as_array().unwrap().is_empty());
    }
}
