//! HTTP endpoints that hand chat requests to the agent process.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use super::process::{AgentProcess, AgentScript};
use super::schema::{AgentRequest, LanggraphRequest, SwarmRequest};
use super::sse;
use crate::deployment::DeploymentKind;
use crate::error::{BridgeError, ValidationIssue};

/// Shared state for bridge routes.
#[derive(Clone)]
pub struct BridgeState {
    pub agent: Arc<AgentProcess>,
    pub deployment: DeploymentKind,
}

/// Build the agent bridge routes.
pub fn bridge_routes(state: BridgeState) -> Router {
    Router::new()
        .route("/api/ai/swarm", post(swarm))
        .route("/api/ai/swarm/langgraph", post(langgraph))
        .with_state(state)
}

/// `GET /health`, kept outside any permission guard.
pub fn health_routes(deployment: DeploymentKind) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(deployment)
}

async fn health(State(deployment): State<DeploymentKind>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cauldron-assist",
        "deployment": deployment,
    }))
}

/// Parse the raw body so that non-JSON input gets the same 400 shape as a
/// schema violation.
fn parse_body(body: &Bytes) -> Result<Value, BridgeError> {
    serde_json::from_slice(body).map_err(|e| {
        BridgeError::Validation(vec![ValidationIssue::new("", format!("Invalid JSON: {e}"))])
    })
}

/// POST /api/ai/swarm
async fn swarm(State(state): State<BridgeState>, body: Bytes) -> Response {
    match parse_body(&body).and_then(SwarmRequest::from_value) {
        Ok(request) => {
            info!(
                agent = %request.agent.name,
                messages = request.messages.len(),
                stream = request.stream,
                "Swarm request"
            );
            run_agent(&state.agent, AgentScript::Swarm, request).await
        }
        Err(e) => e.into_response(),
    }
}

/// POST /api/ai/swarm/langgraph
async fn langgraph(State(state): State<BridgeState>, body: Bytes) -> Response {
    match parse_body(&body).and_then(LanggraphRequest::from_value) {
        Ok(request) => {
            info!(
                workflow = %request.workflow.name,
                nodes = request.workflow.graph.nodes.len(),
                stream = request.stream,
                "Langgraph request"
            );
            run_agent(&state.agent, AgentScript::Langgraph, request).await
        }
        Err(e) => e.into_response(),
    }
}

async fn run_agent<R: AgentRequest>(agent: &AgentProcess, script: AgentScript, request: R) -> Response {
    if request.is_streaming() {
        match agent.stream(script, &request).await {
            Ok(events) => {
                let stream = ReceiverStream::new(events)
                    .map(|event| Ok::<_, Infallible>(Bytes::from(sse::encode(&event))));
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, "text/event-stream"),
                        (header::CACHE_CONTROL, "no-cache"),
                        (header::CONNECTION, "keep-alive"),
                    ],
                    Body::from_stream(stream),
                )
                    .into_response()
            }
            Err(e) => e.into_response(),
        }
    } else {
        match agent.run(script, &request).await {
            Ok(result) => Json(result).into_response(),
            Err(e) => e.into_response(),
        }
    }
}
