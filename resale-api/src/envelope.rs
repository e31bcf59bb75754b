//! Request and response shapes of the action endpoint.
//!
//! Every response is `{ "status": "success", "data": ... }` or
//! `{ "status": "error", "message": ..., "kind": ... }`.

use resale_core::{ErrorKind, ResaleError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// How the caller should treat an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            message: None,
            kind: None,
        }
    }

    pub fn error(err: &ResaleError) -> Self {
        Self {
            status: Status::Error,
            data: None,
            message: Some(err.to_string()),
            kind: Some(err.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

impl From<Result<Value, ResaleError>> for Envelope {
    fn from(result: Result<Value, ResaleError>) -> Self {
        match result {
            Ok(data) => Envelope::success(data),
            Err(e) => Envelope::error(&e),
        }
    }
}
