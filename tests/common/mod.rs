#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use tower::ServiceExt;

use chat_threads::AppState;
use chat_threads::agent::{
    AgentError, AgentState, ConversationAgent, FragmentStream, LlmAgent, MemoryCheckpointer,
};
use chat_threads::llm::{ChatRole, DeltaStream, LlmDriver, LlmRequest};
use chat_threads::server::router;
use chat_threads::session::{EmptyReplyPolicy, ThreadId};

/// Driver that replays scripted replies, falling back to echoing the last
/// user message.
#[derive(Default)]
pub struct ScriptedDriver {
    replies: Mutex<VecDeque<Vec<String>>>,
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedDriver {
    pub fn push_reply(&self, deltas: &[&str]) {
        self.replies
            .lock()
            .unwrap()
            .push_back(deltas.iter().map(ToString::to_string).collect());
    }
}

#[async_trait]
impl LlmDriver for ScriptedDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<DeltaStream> {
        let deltas = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            let last = req
                .messages
                .iter()
                .rev()
                .find(|m| m.role == ChatRole::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            vec!["You said: ".to_string(), last]
        });
        self.requests.lock().unwrap().push(req);
        Ok(Box::pin(futures::stream::iter(
            deltas.into_iter().map(anyhow::Ok),
        )))
    }
}

/// Agent whose backend is down.
pub struct UnavailableAgent;

#[async_trait]
impl ConversationAgent for UnavailableAgent {
    async fn get_state(&self, _thread_id: &ThreadId) -> Result<AgentState, AgentError> {
        Err(AgentError::Unavailable("checkpoint store offline".to_string()))
    }

    async fn list_thread_ids(&self) -> Result<Vec<ThreadId>, AgentError> {
        Err(AgentError::Unavailable("checkpoint store offline".to_string()))
    }

    async fn stream(
        &self,
        _thread_id: &ThreadId,
        _message: &str,
    ) -> Result<FragmentStream, AgentError> {
        Err(AgentError::Unavailable("model offline".to_string()))
    }
}

pub struct TestApp {
    pub app: axum::Router,
    pub driver: Arc<ScriptedDriver>,
}

pub fn test_app(policy: EmptyReplyPolicy) -> TestApp {
    let driver = Arc::new(ScriptedDriver::default());
    let agent: Arc<dyn ConversationAgent> = Arc::new(
        LlmAgent::new(Arc::clone(&driver) as Arc<dyn LlmDriver>, Arc::new(MemoryCheckpointer::new()))
            .with_system_prompt(Some("Be helpful.".to_string())),
    );
    TestApp {
        app: router(AppState::new(agent, policy)),
        driver,
    }
}

pub fn app_with_agent(agent: Arc<dyn ConversationAgent>) -> axum::Router {
    router(AppState::new(agent, EmptyReplyPolicy::Append))
}

/// Send a request and return the response with its body unread.
pub async fn send_raw(
    app: &axum::Router,
    method: &str,
    uri: &str,
    payload: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match payload {
        Some(payload) => {
            builder = builder.header("content-type", "application/json");
            Body::from(payload.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).expect("request build should succeed"))
        .await
        .expect("app should handle request")
}

/// Drain a response body as text.
pub async fn body_text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Send a request and return `(status, headers, body_text)`.
pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    payload: Option<Value>,
) -> (StatusCode, HeaderMap, String) {
    let resp = send_raw(app, method, uri, payload).await;
    let status = resp.status();
    let headers = resp.headers().clone();
    (status, headers, body_text(resp).await)
}

pub async fn send_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    payload: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, text) = send(app, method, uri, payload).await;
    let value = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).expect("json body")
    };
    (status, value)
}

/// Create a session and return its view.
pub async fn create_session(app: &axum::Router) -> Value {
    let (status, view) = send_json(app, "POST", "/api/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    view
}

/// Parse an SSE body into `(event, data)` pairs.
pub fn sse_events(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut event = String::new();
            let mut data = Value::Null;
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = name.to_string();
                } else if let Some(json) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(json).expect("sse data json");
                }
            }
            (event, data)
        })
        .collect()
}
