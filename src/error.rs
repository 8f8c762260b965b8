//! Error types for Cauldron Assist.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised at the local-storage boundary of the session and preference stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend failed: {0}")]
    Backend(#[from] DatabaseError),

    #[error("Failed to serialize {key}: {reason}")]
    Serialize { key: String, reason: String },
}

/// Errors from the agent process bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid request")]
    Validation(Vec<ValidationIssue>),

    #[error("Failed to start agent process: {0}")]
    Spawn(String),

    #[error("{stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("Failed to parse agent response")]
    InvalidOutput(String),

    #[error("Agent process timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error talking to agent process: {0}")]
    Io(#[from] std::io::Error),
}

/// A single schema violation in a bridge request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Default body for a failed process that wrote nothing to stderr.
pub const GENERIC_PROCESS_ERROR: &str = "An error occurred while processing the request";

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            BridgeError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Invalid request", "details": details }),
            ),
            BridgeError::ProcessFailed { stderr, .. } => {
                let message = if stderr.trim().is_empty() {
                    GENERIC_PROCESS_ERROR.to_string()
                } else {
                    stderr.clone()
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": message }),
                )
            }
            BridgeError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                serde_json::json!({ "error": "Agent process timed out" }),
            ),
            BridgeError::Spawn(_) | BridgeError::InvalidOutput(_) | BridgeError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": self.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Errors from a chat backend call made by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Backend {backend} request failed: {reason}")]
    RequestFailed { backend: String, reason: String },

    #[error("Backend {backend} returned an unusable response: {reason}")]
    InvalidResponse { backend: String, reason: String },

    #[error("Dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Dispatch cancelled")]
    Cancelled,

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

/// Speech recognition errors.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech recognition is not supported")]
    Unsupported,

    #[error("Speech recognition already running")]
    AlreadyListening,

    #[error("Failed to start recognizer: {0}")]
    StartFailed(String),
}

/// Authentication / authorization failures raised by request guards.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Forbidden")]
    Forbidden,

    #[error("Permission lookup failed: {0}")]
    Lookup(#[from] DatabaseError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Lookup(ref e) => {
                tracing::error!(error = %e, "Permission lookup failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
