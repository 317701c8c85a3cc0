use crate::core::SpeedyError;
use serde::{Deserialize, Serialize};

/// Command request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Command to execute (e.g., "cache.get", "election.request")
    pub command: String,
    /// Unique request identifier
    pub request_id: String,
    /// Command payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Command response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation succeeded
    pub success: bool,
    /// Matching request identifier
    pub request_id: String,
    /// Response payload (if successful)
    pub payload: Option<serde_json::Value>,
    /// Error message (if failed)
    pub error: Option<String>,
    /// Machine-readable error code (if failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Request {
    /// Create a new request
    pub fn new(command: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            command: command.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
            payload,
        }
    }

    /// Decode the payload into a typed command body
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, SpeedyError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            SpeedyError::InvalidRequest(format!("Bad payload for {}: {}", self.command, e))
        })
    }
}

impl Response {
    /// Create a successful response
    pub fn success(request_id: String, payload: serde_json::Value) -> Self {
        Self {
            success: true,
            request_id,
            payload: Some(payload),
            error: None,
            code: None,
        }
    }

    /// Create an error response carrying the error's wire code
    pub fn error(request_id: String, error: &SpeedyError) -> Self {
        let message = match error {
            // The key alone is enough to rebuild KeyNotFound on the far side
            SpeedyError::KeyNotFound(key) => key.clone(),
            other => other.to_string(),
        };

        Self {
            success: false,
            request_id,
            payload: None,
            error: Some(message),
            code: Some(error.code().to_string()),
        }
    }

    /// Turn the envelope back into a result
    pub fn into_result(self) -> Result<serde_json::Value, SpeedyError> {
        if self.success {
            return Ok(self.payload.unwrap_or(serde_json::Value::Null));
        }

        let message = self.error.unwrap_or_default();
        Err(match self.code {
            Some(code) => SpeedyError::from_code(&code, message),
            None => SpeedyError::Internal(message),
        })
    }
}
