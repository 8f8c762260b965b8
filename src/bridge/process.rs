//! Agent process runner — spawns the agent interpreter per request.
//!
//! The request is written to the child's stdin as one JSON line and stdin is
//! closed. Buffered runs parse stdout as a single JSON document; streaming runs
//! forward stdout line by line. Children are killed on timeout and when the
//! handle is dropped.

use std::path::PathBuf;
use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::schema::AgentRequest;
use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Which bridge script handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentScript {
    Swarm,
    Langgraph,
}

impl AgentScript {
    pub fn label(&self) -> &'static str {
        match self {
            AgentScript::Swarm => "swarm",
            AgentScript::Langgraph => "langgraph",
        }
    }
}

/// Output of a streaming run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// One stdout line, normally a JSON chunk.
    Line(String),
    /// The child exited.
    Exit { code: Option<i32> },
    /// The child ran past the timeout and was killed.
    TimedOut,
}

/// A decoded streaming chunk from the swarm runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentChunk {
    /// `{"delim": "start" | "end"}`; an end delimiter may carry the final response.
    Delim {
        marker: String,
        response: Option<Value>,
    },
    /// `{"content": "..."}` token delta.
    Content(String),
    /// `{"response": {...}}` final run result.
    Response(Value),
    Other(Value),
}

impl AgentChunk {
    /// Decode one stdout line. Non-JSON lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        if let Some(marker) = value.get("delim").and_then(Value::as_str) {
            return Some(AgentChunk::Delim {
                marker: marker.to_string(),
                response: value.get("response").cloned(),
            });
        }
        if let Some(content) = value.get("content").and_then(Value::as_str) {
            return Some(AgentChunk::Content(content.to_string()));
        }
        if let Some(response) = value.get("response") {
            return Some(AgentChunk::Response(response.clone()));
        }
        Some(AgentChunk::Other(value))
    }
}

/// Text of the last assistant message in a run result
/// (`{"messages": [...]}` or a bare message array).
pub fn final_assistant_text(result: &Value) -> Option<String> {
    let messages = result
        .get("messages")
        .and_then(Value::as_array)
        .or_else(|| result.as_array())?;
    messages
        .iter()
        .rev()
        .filter(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
        .find_map(|m| m.get("content").and_then(Value::as_str))
        .map(str::to_string)
}

pub struct AgentProcess {
    config: BridgeConfig,
}

impl AgentProcess {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn script_path(&self, script: AgentScript) -> PathBuf {
        let relative = match script {
            AgentScript::Swarm => &self.config.swarm_script,
            AgentScript::Langgraph => &self.config.langgraph_script,
        };
        self.config.agent_dir.join(relative)
    }

    fn command(&self, script: AgentScript) -> Command {
        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(self.script_path(script))
            .current_dir(&self.config.agent_dir)
            .env("PYTHONPATH", &self.config.agent_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn spawn<R: AgentRequest>(
        &self,
        script: AgentScript,
        request: &R,
    ) -> Result<Child, BridgeError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| BridgeError::Spawn(format!("unserializable request: {e}")))?;
        line.push('\n');

        let mut child = self.command(script).spawn().map_err(|e| {
            BridgeError::Spawn(format!(
                "{} {}: {e}",
                self.config.interpreter,
                self.script_path(script).display()
            ))
        })?;

        debug!(script = script.label(), pid = ?child.id(), "Agent process spawned");

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading its input closes the pipe early.
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(script = script.label(), "Agent process closed stdin early");
                }
                Err(e) => return Err(BridgeError::Io(e)),
            }
            drop(stdin);
        }

        Ok(child)
    }

    /// Run to completion and parse stdout as one JSON document.
    pub async fn run<R: AgentRequest>(
        &self,
        script: AgentScript,
        request: &R,
    ) -> Result<Value, BridgeError> {
        let mut child = self.spawn(script, request).await?;
        let stdout = child.stdout.take();
        let stderr_task = tokio::spawn(drain_stderr(child.stderr.take(), script));

        let result = tokio::time::timeout(self.config.timeout, async {
            let mut out = Vec::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_end(&mut out).await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, String::from_utf8_lossy(&out).into_owned()))
        })
        .await;

        let (status, out) = match result {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => return Err(BridgeError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                warn!(script = script.label(), timeout = ?self.config.timeout, "Agent process timed out");
                return Err(BridgeError::Timeout(self.config.timeout));
            }
        };

        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            warn!(script = script.label(), code = ?status.code(), "Agent process exited with failure");
            return Err(BridgeError::ProcessFailed {
                code: status.code(),
                stderr,
            });
        }

        serde_json::from_str(out.trim()).map_err(|e| {
            warn!(script = script.label(), error = %e, "Error parsing agent response");
            BridgeError::InvalidOutput(e.to_string())
        })
    }

    /// Spawn and forward stdout lines as they arrive.
    ///
    /// Dropping the receiver kills the child.
    pub async fn stream<R: AgentRequest>(
        &self,
        script: AgentScript,
        request: &R,
    ) -> Result<mpsc::Receiver<AgentEvent>, BridgeError> {
        let mut child = self.spawn(script, request).await?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Spawn("stdout not captured".into()))?;
        tokio::spawn(drain_stderr(child.stderr.take(), script));

        let (tx, rx) = mpsc::channel(64);
        let timeout = self.config.timeout;

        tokio::spawn(async move {
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();

            loop {
                tokio::select! {
                    _ = &mut deadline => {
                        let _ = child.kill().await;
                        warn!(script = script.label(), timeout = ?timeout, "Streaming agent process timed out");
                        let _ = tx.send(AgentEvent::TimedOut).await;
                        return;
                    }
                    _ = tx.closed() => {
                        let _ = child.kill().await;
                        info!(script = script.label(), "Stream consumer went away, agent process killed");
                        return;
                    }
                    read = reader.read_until(b'\n', &mut buf) => match read {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = lossy_line(&buf);
                            buf.clear();
                            if line.trim().is_empty() {
                                continue;
                            }
                            if tx.send(AgentEvent::Line(line)).await.is_err() {
                                let _ = child.kill().await;
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(script = script.label(), error = %e, "Failed reading agent stdout");
                            break;
                        }
                    },
                }
            }

            let code = match tokio::time::timeout_at(deadline.deadline(), child.wait()).await {
                Ok(Ok(status)) => status.code(),
                Ok(Err(e)) => {
                    warn!(script = script.label(), error = %e, "Failed waiting for agent process");
                    None
                }
                Err(_) => {
                    let _ = child.kill().await;
                    let _ = tx.send(AgentEvent::TimedOut).await;
                    return;
                }
            };
            if code != Some(0) {
                warn!(script = script.label(), code = ?code, "Agent process exited with failure");
            }
            let _ = tx.send(AgentEvent::Exit { code }).await;
        });

        Ok(rx)
    }
}

/// Log stderr line by line and return everything that was written.
async fn drain_stderr(stderr: Option<ChildStderr>, script: AgentScript) -> String {
    let Some(stderr) = stderr else {
        return String::new();
    };
    let mut collected = String::new();
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    while let Ok(n) = reader.read_until(b'\n', &mut buf).await {
        if n == 0 {
            break;
        }
        let line = lossy_line(&buf);
        buf.clear();
        warn!(script = script.label(), line = %line, "Agent stderr");
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}

/// Decode one raw output line, replacing invalid UTF-8 so reading never stalls.
fn lossy_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
