//! REST endpoints for the assistant session.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::context::ContextResolver;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::render::ConversationRenderer;
use super::store::SessionStore;

/// Shared state for assistant routes.
#[derive(Clone)]
pub struct AssistantState {
    pub store: Arc<SessionStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub resolver: Arc<ContextResolver>,
    pub renderer: Arc<ConversationRenderer>,
}

#[derive(Debug, Deserialize)]
struct SendBody {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ContextBody {
    path: String,
}

fn storage_failure(e: impl std::fmt::Display) -> Response {
    error!(error = %e, "Session storage failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": format!("Failed to persist session: {e}")})),
    )
        .into_response()
}

/// GET /api/assistant/session
async fn get_session(State(state): State<AssistantState>) -> impl IntoResponse {
    Json(state.store.snapshot().await)
}

/// POST /api/assistant/toggle
async fn toggle(State(state): State<AssistantState>) -> impl IntoResponse {
    state.store.toggle_open().await;
    Json(state.store.snapshot().await)
}

/// POST /api/assistant/messages
///
/// Dispatches one user message and answers with the updated conversation.
/// Blank input is acknowledged with 202 and changes nothing. Backend
/// failures are part of the conversation, not an HTTP error.
async fn send_message(State(state): State<AssistantState>, Json(body): Json<SendBody>) -> Response {
    match state.dispatcher.send(&body.content).await {
        Ok(DispatchOutcome::Ignored) => {
            (StatusCode::ACCEPTED, Json(json!({"ignored": true}))).into_response()
        }
        Ok(_) => Json(state.store.messages().await).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// DELETE /api/assistant/messages
async fn clear_messages(State(state): State<AssistantState>) -> Response {
    match state.store.clear_messages().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => storage_failure(e),
    }
}

/// PUT /api/assistant/context
///
/// Resolves a route path to its module description and makes it current.
async fn set_context(State(state): State<AssistantState>, Json(body): Json<ContextBody>) -> Response {
    let context = state.resolver.resolve(&body.path).await;
    match state.store.set_current_module_context(context.clone()).await {
        Ok(()) => Json(json!({"context": context})).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// GET /api/assistant/view
async fn get_view(State(state): State<AssistantState>) -> impl IntoResponse {
    let session = state.store.snapshot().await;
    Json(state.renderer.render(&session.messages, session.is_loading))
}

/// Build the assistant session routes.
pub fn assistant_routes(state: AssistantState) -> Router {
    Router::new()
        .route("/api/assistant/session", get(get_session))
        .route("/api/assistant/toggle", post(toggle))
        .route(
            "/api/assistant/messages",
            post(send_message).delete(clear_messages),
        )
        .route("/api/assistant/context", put(set_context))
        .route("/api/assistant/view", get(get_view))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, header};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::assistant::backend::{ChatBackend, ChatRequest};
    use crate::error::DispatchError;
    use crate::store::MemoryStorage;

    struct Echo;

    #[async_trait]
    impl ChatBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: ChatRequest,
            _updates: mpsc::UnboundedSender<String>,
            _cancel: CancellationToken,
        ) -> Result<String, DispatchError> {
            let last = request.history.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("echo: {last}"))
        }
    }

    async fn state() -> AssistantState {
        let store = SessionStore::open(Arc::new(MemoryStorage::new())).await.unwrap();
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(Echo), Duration::from_secs(5));
        AssistantState {
            store,
            dispatcher: Arc::new(dispatcher),
            resolver: Arc::new(ContextResolver::with_defaults()),
            renderer: Arc::new(ConversationRenderer::new()),
        }
    }

    fn request(method: &str, uri: &str, body: Option<&str>) -> HttpRequest<Body> {
        let builder = HttpRequest::builder().method(method).uri(uri);
        match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn call(router: Router, req: HttpRequest<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn send_appends_user_and_reply() {
        let router = assistant_routes(state().await);
        let (status, json) = call(
            router,
            request("POST", "/api/assistant/messages", Some(r#"{"content":"ping"}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let msgs = json.as_array().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[1]["content"], "echo: ping");
        assert_eq!(msgs[1]["type"], "markdown");
    }

    #[tokio::test]
    async fn blank_send_is_ignored() {
        let s = state().await;
        let (status, json) = call(
            assistant_routes(s.clone()),
            request("POST", "/api/assistant/messages", Some(r#"{"content":"  "}"#)),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["ignored"], true);
        assert!(s.store.messages().await.is_empty());
    }

    #[tokio::test]
    async fn context_resolves_route_paths() {
        let s = state().await;
        let (_, json) = call(
            assistant_routes(s.clone()),
            request("PUT", "/api/assistant/context", Some(r#"{"path":"/users/42"}"#)),
        )
        .await;
        assert!(json["context"].as_str().unwrap().starts_with("Users"));

        let (_, json) = call(
            assistant_routes(s.clone()),
            request("PUT", "/api/assistant/context", Some(r#"{"path":"/nowhere"}"#)),
        )
        .await;
        assert!(json["context"].is_null());
        assert!(s.store.current_module_context().await.is_none());
    }

    #[tokio::test]
    async fn toggle_clear_and_view() {
        let s = state().await;
        let (_, json) = call(assistant_routes(s.clone()), request("POST", "/api/assistant/toggle", None)).await;
        assert_eq!(json["isOpen"], true);

        call(
            assistant_routes(s.clone()),
            request("POST", "/api/assistant/messages", Some(r#"{"content":"hi"}"#)),
        )
        .await;
        let (_, view) = call(assistant_routes(s.clone()), request("GET", "/api/assistant/view", None)).await;
        assert_eq!(view["bubbles"].as_array().unwrap().len(), 2);
        assert_eq!(view["bubbles"][0]["side"], "right");
        assert_eq!(view["needsScroll"], true);

        let (status, _) = call(assistant_routes(s.clone()), request("DELETE", "/api/assistant/messages", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, session) = call(assistant_routes(s), request("GET", "/api/assistant/session", None)).await;
        assert!(session["messages"].as_array().unwrap().is_empty());
        assert_eq!(session["isOpen"], true);
    }
}
