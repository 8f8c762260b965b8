//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::deployment::DeploymentKind;

/// Storage key for the persisted assistant session.
pub const SESSION_STORAGE_KEY: &str = "ai-assistant-storage";

/// Default model for the OpenAI-compatible backend.
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

/// Default base URL for the OpenAI-compatible backend.
pub const DEFAULT_PROVIDER_URL: &str = "https://api.groq.com/openai/v1";

/// Read an env var and parse it, falling back to `default` on absence or parse failure.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// How the agent subprocess is launched.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Directory holding the agent library; used as cwd and `PYTHONPATH`.
    pub agent_dir: PathBuf,
    /// Interpreter executable (e.g. `python`).
    pub interpreter: String,
    /// Script for plain swarm requests, relative to `agent_dir`.
    pub swarm_script: PathBuf,
    /// Script for langgraph workflow requests, relative to `agent_dir`.
    pub langgraph_script: PathBuf,
    /// Wall-clock limit for one agent process.
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            agent_dir: PathBuf::from("./swarm-groq"),
            interpreter: "python".to_string(),
            swarm_script: PathBuf::from("examples/api_bridge.py"),
            langgraph_script: PathBuf::from("examples/langgraph_bridge.py"),
            timeout: Duration::from_secs(120),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            agent_dir: std::env::var("CAULDRON_AGENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.agent_dir),
            interpreter: std::env::var("CAULDRON_AGENT_INTERPRETER")
                .unwrap_or(defaults.interpreter),
            swarm_script: std::env::var("CAULDRON_SWARM_SCRIPT")
                .map(PathBuf::from)
                .unwrap_or(defaults.swarm_script),
            langgraph_script: std::env::var("CAULDRON_LANGGRAPH_SCRIPT")
                .map(PathBuf::from)
                .unwrap_or(defaults.langgraph_script),
            timeout: Duration::from_secs(env_parse("CAULDRON_AGENT_TIMEOUT_SECS", 120)),
        }
    }
}

/// Which chat backend the dispatcher talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatBackendKind {
    /// Run the agent process in-process through the bridge.
    Bridge,
    /// Call a (possibly remote) bridge over HTTP.
    BridgeHttp,
    /// Call an OpenAI-compatible chat completions API directly.
    OpenAi,
}

/// Credentials and model for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PROVIDER_URL.to_string()),
            api_key: std::env::var("GROQ_API_KEY").ok().map(SecretString::from),
            model: std::env::var("GROQ_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }
}

/// Service-wide configuration.
#[derive(Debug, Clone)]
pub struct AssistConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub bridge: BridgeConfig,
    pub backend: ChatBackendKind,
    /// Base URL of the bridge for `ChatBackendKind::BridgeHttp`.
    pub bridge_url: String,
    /// User id sent as `x-user-id` on bridge-over-HTTP calls.
    pub service_user: Option<String>,
    pub provider: ProviderConfig,
    /// Deadline applied to every dispatcher backend call.
    pub dispatch_timeout: Duration,
    /// Guard bridge and tenancy routes with permission checks.
    pub enforce_permissions: bool,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    /// Optional transcription command for voice input (whitespace-separated argv).
    pub speech_command: Option<Vec<String>>,
    /// Run the local terminal chat alongside the server.
    pub cli: bool,
    /// Optional directory for a rolling log file.
    pub log_dir: Option<PathBuf>,
    pub deployment: DeploymentKind,
}

impl AssistConfig {
    pub fn from_env() -> Self {
        let backend = match std::env::var("CAULDRON_CHAT_BACKEND")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "openai" | "groq" => ChatBackendKind::OpenAi,
            "bridge-http" | "http" => ChatBackendKind::BridgeHttp,
            _ => ChatBackendKind::Bridge,
        };

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let speech_command = std::env::var("CAULDRON_SPEECH_COMMAND")
            .ok()
            .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty());

        let port = env_parse("CAULDRON_PORT", 8080);
        let enforce_permissions = env_flag("CAULDRON_ENFORCE_PERMISSIONS", false);
        let service_user = std::env::var("CAULDRON_SERVICE_USER_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let backend = effective_backend(backend, enforce_permissions, service_user.as_deref());

        Self {
            port,
            db_path: std::env::var("CAULDRON_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/cauldron-assist.db")),
            bridge: BridgeConfig::from_env(),
            backend,
            bridge_url: std::env::var("CAULDRON_BRIDGE_URL")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{port}")),
            service_user,
            provider: ProviderConfig::from_env(),
            dispatch_timeout: Duration::from_secs(env_parse("CAULDRON_DISPATCH_TIMEOUT_SECS", 120)),
            enforce_permissions,
            cors_origins,
            speech_command,
            cli: env_flag("CAULDRON_CLI", true),
            log_dir: std::env::var("LOG_FILE_PATH").ok().map(PathBuf::from),
            deployment: DeploymentKind::from_env(),
        }
    }
}

/// A gated bridge rejects anonymous calls, so bridge-over-HTTP needs a
/// service user once permissions are enforced. Without one, fall back to the
/// in-process bridge.
pub fn effective_backend(
    requested: ChatBackendKind,
    enforce_permissions: bool,
    service_user: Option<&str>,
) -> ChatBackendKind {
    if requested == ChatBackendKind::BridgeHttp && enforce_permissions && service_user.is_none() {
        warn!(
            "CAULDRON_CHAT_BACKEND=bridge-http with enforced permissions needs \
             CAULDRON_SERVICE_USER_ID; using the in-process bridge instead"
        );
        return ChatBackendKind::Bridge;
    }
    requested
}
