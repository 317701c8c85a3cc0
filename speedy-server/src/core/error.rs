use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for Speedy operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpeedyError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Shard {shard} owning key {key} is unavailable")]
    ShardUnavailable { shard: String, key: String },

    #[error("No shards registered")]
    NoShards,

    #[error("Leader not found")]
    LeaderNotFound,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpeedyError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::KeyNotFound(_) | Self::LeaderNotFound => StatusCode::NOT_FOUND,
            Self::ShardUnavailable { .. } | Self::NoShards => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::UnknownCommand(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Serialization(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code carried in error envelopes so the condition
    /// survives a round trip over the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeyNotFound(_) => "not_found",
            Self::ShardUnavailable { .. } => "shard_unavailable",
            Self::NoShards => "no_shards",
            Self::LeaderNotFound => "leader_not_found",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::UnknownCommand(_) => "unknown_command",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Rebuild an error from its wire code and message.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "not_found" => Self::KeyNotFound(message),
            "leader_not_found" => Self::LeaderNotFound,
            "no_shards" => Self::NoShards,
            "timeout" => Self::Timeout(message),
            "unknown_command" => Self::UnknownCommand(message),
            "invalid_request" => Self::InvalidRequest(message),
            "serialization" => Self::Serialization(message),
            "config" => Self::Config(message),
            "transport" | "shard_unavailable" => Self::Transport(message),
            _ => Self::Internal(message),
        }
    }

    /// Whether a client should treat this error as a cache miss.
    ///
    /// Stale routing and unreachable owners surface the same way as a real
    /// miss: the value is simply not available from the cache right now.
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound(_) | Self::ShardUnavailable { .. } | Self::NoShards
        )
    }
}

/// Implement IntoResponse for Axum integration
impl IntoResponse for SpeedyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for Speedy operations
pub type Result<T> = std::result::Result<T, SpeedyError>;
