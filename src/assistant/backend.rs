//! Chat backends — where the dispatcher sends a conversation.
//!
//! - `ProcessBackend` runs the agent process in-process through the bridge
//! - `BridgeHttpBackend` calls a remote bridge's `/api/ai/swarm` over HTTP
//! - `OpenAiCompatBackend` talks to an OpenAI-compatible chat completions API
//!
//! Every backend streams cumulative partial content through `updates` and
//! returns the final text.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::process::final_assistant_text;
use crate::bridge::sse::SseDecoder;
use crate::bridge::{AgentChunk, AgentEvent, AgentProcess, AgentScript, AgentSpec, ChatTurn, SwarmRequest};
use crate::config::{AssistConfig, ChatBackendKind, ProviderConfig};
use crate::error::{BridgeError, DispatchError};
use crate::permissions::USER_ID_HEADER;

/// A conversation ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system_prompt: String,
    /// Prior turns plus the new user turn, oldest first.
    pub history: Vec<ChatTurn>,
}

impl ChatRequest {
    /// System prompt followed by the history, as chat-completions messages.
    pub fn to_messages(&self) -> Vec<ChatTurn> {
        std::iter::once(ChatTurn::new("system", self.system_prompt.clone()))
            .chain(self.history.iter().cloned())
            .collect()
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run the conversation. Cumulative partial text goes to `updates`; the
    /// final text is returned. Must stop promptly once `cancel` fires.
    async fn complete(
        &self,
        request: ChatRequest,
        updates: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<String, DispatchError>;
}

/// Pick the backend named by the config.
pub fn build_backend(config: &AssistConfig, agent: Arc<AgentProcess>) -> Arc<dyn ChatBackend> {
    match config.backend {
        ChatBackendKind::Bridge => {
            info!(agent_dir = %config.bridge.agent_dir.display(), "Chat backend: agent bridge");
            Arc::new(ProcessBackend::new(agent, config.provider.model.clone()))
        }
        ChatBackendKind::BridgeHttp => {
            info!(url = %config.bridge_url, "Chat backend: bridge over HTTP");
            let backend =
                BridgeHttpBackend::new(config.bridge_url.clone(), config.provider.model.clone());
            Arc::new(match &config.service_user {
                Some(user_id) => backend.with_principal(user_id.clone()),
                None => backend,
            })
        }
        ChatBackendKind::OpenAi => {
            info!(base_url = %config.provider.base_url, model = %config.provider.model, "Chat backend: OpenAI-compatible");
            Arc::new(OpenAiCompatBackend::new(config.provider.clone()))
        }
    }
}

/// Agent definition used for assistant turns; instructions carry the system prompt.
fn assistant_agent(model: &str, instructions: &str) -> AgentSpec {
    AgentSpec::new("Assistant", instructions).with_model(model)
}

/// Folds swarm stream chunks into partial and final text.
#[derive(Debug, Default)]
struct ChunkAccumulator {
    content: String,
    final_text: Option<String>,
}

impl ChunkAccumulator {
    /// Apply one stdout line. Returns true when the partial text grew.
    fn apply(&mut self, line: &str) -> bool {
        match AgentChunk::parse(line) {
            Some(AgentChunk::Content(delta)) => {
                self.content.push_str(&delta);
                true
            }
            Some(AgentChunk::Response(response))
            | Some(AgentChunk::Delim {
                response: Some(response),
                ..
            }) => {
                if let Some(text) = final_assistant_text(&response) {
                    self.final_text = Some(text);
                }
                false
            }
            Some(AgentChunk::Delim { .. }) | Some(AgentChunk::Other(_)) => false,
            None => {
                debug!(line = %line, "Skipping non-JSON agent output");
                false
            }
        }
    }

    fn finish(self) -> String {
        self.final_text.unwrap_or(self.content)
    }
}

// ── In-process bridge ───────────────────────────────────────────────

pub struct ProcessBackend {
    agent: Arc<AgentProcess>,
    model: String,
}

impl ProcessBackend {
    pub fn new(agent: Arc<AgentProcess>, model: impl Into<String>) -> Self {
        Self {
            agent,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatBackend for ProcessBackend {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn complete(
        &self,
        request: ChatRequest,
        updates: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<String, DispatchError> {
        let swarm = SwarmRequest {
            messages: request.history,
            context_variables: Default::default(),
            agent: assistant_agent(&self.model, &request.system_prompt),
            stream: true,
        };
        let mut events = self.agent.stream(AgentScript::Swarm, &swarm).await?;
        let mut acc = ChunkAccumulator::default();

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
                ev = events.recv() => ev,
            };
            match event {
                Some(AgentEvent::Line(line)) => {
                    if acc.apply(&line) {
                        let _ = updates.send(acc.content.clone());
                    }
                }
                Some(AgentEvent::Exit { code: Some(0) }) => break,
                Some(AgentEvent::Exit { code }) => {
                    return Err(DispatchError::Bridge(BridgeError::ProcessFailed {
                        code,
                        stderr: String::new(),
                    }));
                }
                Some(AgentEvent::TimedOut) => {
                    return Err(BridgeError::Timeout(self.agent.config().timeout).into());
                }
                None => {
                    return Err(DispatchError::InvalidResponse {
                        backend: self.name().to_string(),
                        reason: "agent stream ended without exit status".into(),
                    });
                }
            }
        }

        Ok(acc.finish())
    }
}

// ── Remote bridge over HTTP ─────────────────────────────────────────

pub struct BridgeHttpBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    /// Sent as `x-user-id` so a permission-gated bridge admits the call.
    principal: Option<String>,
}

impl BridgeHttpBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            principal: None,
        }
    }

    pub fn with_principal(mut self, user_id: impl Into<String>) -> Self {
        self.principal = Some(user_id.into());
        self
    }

    fn failed(&self, reason: impl std::fmt::Display) -> DispatchError {
        DispatchError::RequestFailed {
            backend: self.name().to_string(),
            reason: reason.to_string(),
        }
    }

    async fn stream_reply(
        &self,
        body: &SwarmRequest,
        updates: &mpsc::UnboundedSender<String>,
    ) -> Result<String, DispatchError> {
        let mut req = self.client.post(format!("{}/api/ai/swarm", self.base_url));
        if let Some(user_id) = &self.principal {
            req = req.header(USER_ID_HEADER, user_id);
        }
        let resp = req
            .json(body)
            .send()
            .await
            .map_err(|e| self.failed(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail: Value = resp.json().await.unwrap_or_default();
            let reason = detail
                .get("error")
                .or_else(|| detail.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(self.failed(reason));
        }

        let mut acc = ChunkAccumulator::default();
        let mut decoder = SseDecoder::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| self.failed(e))?;
            for msg in decoder.push(&bytes) {
                if msg.is("done") {
                    let code = serde_json::from_str::<Value>(&msg.data)
                        .ok()
                        .and_then(|v| v.get("exit_code").and_then(Value::as_i64));
                    if code != Some(0) {
                        return Err(self.failed(format!("agent exited with {code:?}")));
                    }
                    return Ok(acc.finish());
                }
                if msg.is("error") {
                    return Err(self.failed(msg.data));
                }
                if acc.apply(&msg.data) {
                    let _ = updates.send(acc.content.clone());
                }
            }
        }
        warn!(backend = self.name(), "Bridge stream closed without done event");
        Err(self.failed("stream closed before done"))
    }
}

#[async_trait]
impl ChatBackend for BridgeHttpBackend {
    fn name(&self) -> &str {
        "bridge-http"
    }

    async fn complete(
        &self,
        request: ChatRequest,
        updates: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<String, DispatchError> {
        let body = SwarmRequest {
            messages: request.history,
            context_variables: Default::default(),
            agent: assistant_agent(&self.model, &request.system_prompt),
            stream: true,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            result = self.stream_reply(&body, &updates) => result,
        }
    }
}

// ── OpenAI-compatible provider ──────────────────────────────────────

pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiCompatBackend {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn failed(&self, reason: impl std::fmt::Display) -> DispatchError {
        DispatchError::RequestFailed {
            backend: self.name().to_string(),
            reason: reason.to_string(),
        }
    }

    async fn stream_reply(
        &self,
        api_key: &SecretString,
        body: &Value,
        updates: &mpsc::UnboundedSender<String>,
    ) -> Result<String, DispatchError> {
        let resp = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| self.failed(e))?;
        if !resp.status().is_success() {
            return Err(self.failed(format!("HTTP {}", resp.status())));
        }

        let mut content = String::new();
        let mut decoder = SseDecoder::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| self.failed(e))?;
            for msg in decoder.push(&bytes) {
                let data = msg.data.trim();
                if data == "[DONE]" {
                    return Ok(content);
                }
                let Ok(v) = serde_json::from_str::<Value>(data) else {
                    continue;
                };
                let piece = v
                    .pointer("/choices/0/delta/content")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !piece.is_empty() {
                    content.push_str(piece);
                    let _ = updates.send(content.clone());
                }
            }
        }
        if content.is_empty() {
            return Err(DispatchError::InvalidResponse {
                backend: self.name().to_string(),
                reason: "empty completion stream".into(),
            });
        }
        Ok(content)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        request: ChatRequest,
        updates: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<String, DispatchError> {
        let Some(api_key) = self.config.api_key.as_ref() else {
            return Err(self.failed("GROQ_API_KEY is not set"));
        };
        let messages: Vec<Value> = request
            .to_messages()
            .into_iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.7,
            "max_tokens": 1024,
            "stream": true,
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            result = self.stream_reply(api_key, &body, &updates) => result,
        }
    }
}
