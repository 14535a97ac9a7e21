use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;

use crate::{AnalyticsError, Result};

/// Normalized response body.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Body declared as `application/json`.
    Json(JsonValue),
    /// Any other body, read as text.
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    /// Converts into a JSON value; text bodies become a JSON string.
    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => JsonValue::String(text),
        }
    }

    /// Deserializes the payload into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.into_json())
            .map_err(|err| AnalyticsError::Decode(format!("unexpected payload shape: {err}")))
    }

    /// Short human-readable description, used in error messages.
    pub fn summary(&self) -> String {
        match self {
            Self::Json(value) => ["message", "error", "detail"]
                .iter()
                .find_map(|key| value.get(*key).and_then(JsonValue::as_str))
                .map(str::to_owned)
                .unwrap_or_else(|| value.to_string()),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Result of a request as a value rather than an error.
///
/// Route interceptors answer with this type, and
/// [`AnalyticsClient::request_envelope`](crate::AnalyticsClient::request_envelope)
/// folds every outcome into it.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseEnvelope {
    Success {
        data: Payload,
    },
    Failure {
        /// Present only when a response was actually received.
        status: Option<u16>,
        status_text: String,
        body: Option<Payload>,
    },
}

impl ResponseEnvelope {
    pub fn success(data: impl Into<Payload>) -> Self {
        Self::Success { data: data.into() }
    }

    pub fn failure(status: u16, body: impl Into<Payload>) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_owned();
        Self::Failure {
            status: Some(status),
            status_text,
            body: Some(body.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Converts into the `Result` form returned by the request methods.
    pub fn into_result(self) -> Result<Payload> {
        match self {
            Self::Success { data } => Ok(data),
            Self::Failure {
                status: Some(status),
                status_text,
                body,
            } => Err(AnalyticsError::Http {
                status,
                status_text,
                body: body.unwrap_or_else(|| Payload::Text(String::new())),
            }),
            Self::Failure {
                status: None,
                status_text,
                body,
            } => Err(AnalyticsError::Intercepted { status_text, body }),
        }
    }
}

impl From<Result<Payload>> for ResponseEnvelope {
    fn from(result: Result<Payload>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(err) => {
                let status = err.received_status();
                let body = match err {
                    AnalyticsError::Http { body, .. } => Some(body),
                    AnalyticsError::Parse { snippet, .. }
                    | AnalyticsError::UnsupportedContent { snippet, .. } => {
                        Some(Payload::Text(snippet))
                    }
                    AnalyticsError::Intercepted { body, .. } => body,
                    ref other => Some(Payload::Text(other.to_string())),
                };
                let status_text = status
                    .and_then(|code| reqwest::StatusCode::from_u16(code).ok())
                    .and_then(|code| code.canonical_reason())
                    .unwrap_or("request failed")
                    .to_owned();
                Self::Failure {
                    status,
                    status_text,
                    body,
                }
            }
        }
    }
}

impl From<JsonValue> for Payload {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Upload progress event passed to the caller's callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes handed to the transport so far.
    pub loaded: u64,
    /// Size of the file being uploaded.
    pub total: u64,
    /// Percentage in `0..=100`.
    pub progress: u8,
    /// Set on the final event when the upload failed.
    pub error: Option<String>,
}

impl UploadProgress {
    pub(crate) fn at(loaded: u64, total: u64) -> Self {
        let progress = if total == 0 {
            100
        } else {
            (loaded.min(total).saturating_mul(100) / total) as u8
        };
        Self {
            loaded,
            total,
            progress,
            error: None,
        }
    }

    /// Progress while the server has not answered yet; never reports 100%.
    pub(crate) fn in_flight(loaded: u64, total: u64) -> Self {
        let at = Self::at(loaded, total);
        Self {
            progress: at.progress.min(99),
            ..at
        }
    }

    pub(crate) fn failed(loaded: u64, total: u64, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::in_flight(loaded, total)
        }
    }

    /// True only for the final event of an accepted upload.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.progress == 100
    }
}

/// Combined dashboard data returned by
/// [`AnalyticsClient::get_batch`](crate::AnalyticsClient::get_batch).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub overview: JsonValue,
    pub growth: JsonValue,
    pub reach: JsonValue,
    pub top_posts: JsonValue,
    /// `{"metrics": [], "timestamp": ..}` when the real-time call failed.
    pub real_time: JsonValue,
    /// `{"alerts": [], "timestamp": ..}` when the alerts call failed.
    pub alerts: JsonValue,
    pub timestamp: DateTime<Utc>,
}
