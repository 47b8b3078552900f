use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, get_service, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::agent::ConversationAgent;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::events::sse_event;
use crate::session::{
    ChatSession, EXPORT_FILE_NAME, Message, SessionHandle, SessionStore, ThreadId,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get_service(ServeFile::new("static/index.html")))
        .route("/health", get(|| async { "ok" }))
        .route("/api/sessions", post(api_create_session))
        .route(
            "/api/sessions/{sid}",
            get(api_get_session).delete(api_delete_session),
        )
        .route(
            "/api/sessions/{sid}/threads",
            get(api_list_threads).post(api_new_thread),
        )
        .route(
            "/api/sessions/{sid}/threads/{tid}/select",
            post(api_select_thread),
        )
        .route("/api/sessions/{sid}/messages", get(api_get_messages))
        .route("/api/sessions/{sid}/export", get(api_export))
        .route("/api/sessions/{sid}/chat", post(api_chat))
        .route("/api/sessions/{sid}/cancel", post(api_cancel))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(
    config: Arc<AppConfig>,
    agent: Arc<dyn ConversationAgent>,
) -> anyhow::Result<()> {
    let state = AppState::new(agent, config.session.empty_reply_policy());

    spawn_session_reaper(
        state.sessions.clone(),
        config.session.cleanup_interval(),
        config.session.idle_timeout(),
    );

    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn spawn_session_reaper(sessions: SessionStore, every: Duration, idle_timeout: Duration) {
    tokio::spawn(reap_idle_sessions(sessions, every, idle_timeout));
}

/// Periodically drop sessions idle longer than `idle_timeout`.
async fn reap_idle_sessions(sessions: SessionStore, every: Duration, idle_timeout: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let removed = sessions.cleanup_expired_with_timeout(idle_timeout).await;
        if removed > 0 {
            let remaining = sessions.len().await;
            info!(
                name: "session.expired",
                removed = removed,
                remaining = remaining,
                "Expired idle sessions"
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Sidebar entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadDto {
    pub id: String,
    pub label: String,
}

/// Snapshot of a session for the browser.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub active_thread_id: String,
    /// Threads, most recently created first.
    pub threads: Vec<ThreadDto>,
    pub messages: Vec<Message>,
}

fn thread_list(chat: &ChatSession) -> Vec<ThreadDto> {
    chat.registry()
        .list()
        .map(|t| ThreadDto {
            id: t.id.to_string(),
            label: t.label.clone(),
        })
        .collect()
}

async fn session_view(handle: &SessionHandle) -> SessionView {
    let session_id = handle.id().to_string();
    handle
        .read(|chat| SessionView {
            session_id,
            active_thread_id: chat.active_thread_id().to_string(),
            threads: thread_list(chat),
            messages: chat.transcript().messages().to_vec(),
        })
        .await
}

async fn find(state: &AppState, sid: &str) -> Result<SessionHandle, ApiError> {
    state
        .sessions
        .get(sid)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(sid.to_string()))
}

/// POST /api/sessions - Start a session on a fresh thread.
async fn api_create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let chat = ChatSession::start(state.agent.as_ref(), state.empty_replies).await;
    let handle = state.sessions.create(chat).await;

    info!(
        name: "session.created",
        session_id = %handle.id(),
        "Session created"
    );

    (StatusCode::CREATED, Json(session_view(&handle).await))
}

/// GET /api/sessions/:sid - Session snapshot.
async fn api_get_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = find(&state, &sid).await?;
    Ok(Json(session_view(&handle).await))
}

/// DELETE /api/sessions/:sid - End a session.
async fn api_delete_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> StatusCode {
    match state.sessions.remove(&sid).await {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// GET /api/sessions/:sid/threads - Sidebar threads, newest first.
async fn api_list_threads(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<Vec<ThreadDto>>, ApiError> {
    let handle = find(&state, &sid).await?;
    Ok(Json(handle.read(thread_list).await))
}

/// POST /api/sessions/:sid/threads - New chat.
async fn api_new_thread(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = find(&state, &sid).await?;
    handle.new_chat().await;
    Ok(Json(session_view(&handle).await))
}

/// POST /api/sessions/:sid/threads/:tid/select - Switch thread.
async fn api_select_thread(
    State(state): State<AppState>,
    Path((sid, tid)): Path<(String, String)>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = find(&state, &sid).await?;
    handle
        .switch_to(state.agent.as_ref(), ThreadId::from(tid))
        .await?;
    Ok(Json(session_view(&handle).await))
}

/// GET /api/sessions/:sid/messages - Active transcript.
async fn api_get_messages(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let handle = find(&state, &sid).await?;
    Ok(Json(
        handle.read(|chat| chat.transcript().messages().to_vec()).await,
    ))
}

/// GET /api/sessions/:sid/export - Transcript as a text download.
async fn api_export(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Response, ApiError> {
    let handle = find(&state, &sid).await?;
    let text = handle.read(ChatSession::export_text).await;
    let disposition = format!("attachment; filename=\"{EXPORT_FILE_NAME}\"");

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        text,
    )
        .into_response())
}

/// Request body for the chat API.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// User message. Anything but a non-blank string is ignored.
    #[serde(default)]
    message: serde_json::Value,
}

/// POST /api/sessions/:sid/chat - Submit a message and stream the reply.
async fn api_chat(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let handle = find(&state, &sid).await?;

    let Some(text) = req.message.as_str() else {
        tracing::debug!(session_id = %sid, "Ignoring non-string chat input");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let Some(events) = handle.submit(Arc::clone(&state.agent), text).await else {
        tracing::debug!(session_id = %sid, "Ignoring blank chat input");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let body = Body::from_stream(events.map(|evt| Ok::<String, Infallible>(sse_event(&evt))));
    Ok(build_sse_response(body))
}

/// POST /api/sessions/:sid/cancel - Abandon the in-flight reply.
async fn api_cancel(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let handle = find(&state, &sid).await?;
    handle.cancel_in_flight().await;
    Ok(StatusCode::NO_CONTENT)
}

fn build_sse_response(body: Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}
