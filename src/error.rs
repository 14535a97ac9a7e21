use crate::Payload;

/// Status reported for client-side timeouts. Not produced by the server.
pub const SYNTHETIC_TIMEOUT_STATUS: u16 = 408;
/// Status reported when the transport cannot reach the backend.
pub const SYNTHETIC_UNAVAILABLE_STATUS: u16 = 503;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// The attempt did not complete within its timeout.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    /// Connection-level failure reported by `reqwest`; no response was received.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(#[source] reqwest::Error),
    /// Non-success HTTP status with the normalized response body.
    #[error("http error {status} {status_text}: {}", .body.summary())]
    Http {
        status: u16,
        status_text: String,
        /// Parsed JSON detail, or a truncated text snippet.
        body: Payload,
    },
    /// A JSON response whose body is not valid JSON.
    #[error("invalid JSON response (status {status}): {source}")]
    Parse {
        status: u16,
        /// Truncated body for diagnostics.
        snippet: String,
        #[source]
        source: serde_json::Error,
    },
    /// Non-success status paired with a body the client cannot interpret.
    #[error("unsupported response content type '{content_type}' (status {status})")]
    UnsupportedContent {
        status: u16,
        content_type: String,
        snippet: String,
    },
    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,
    /// A route interceptor answered with a failure that carries no status.
    #[error("intercepted request failed: {status_text}")]
    Intercepted {
        status_text: String,
        body: Option<Payload>,
    },
    /// The request could not be built (bad URL, header or body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Payload did not match the requested type.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Tagged discriminant of [`AnalyticsError`], used for retry classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    NetworkUnavailable,
    Http(u16),
    Parse,
    UnsupportedContent,
    Cancelled,
    Intercepted,
    InvalidRequest,
    Config,
    Decode,
}

impl AnalyticsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            Self::Http { status, .. } => ErrorKind::Http(*status),
            Self::Parse { .. } => ErrorKind::Parse,
            Self::UnsupportedContent { .. } => ErrorKind::UnsupportedContent,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Intercepted { .. } => ErrorKind::Intercepted,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Config(_) => ErrorKind::Config,
            Self::Decode(_) => ErrorKind::Decode,
        }
    }

    /// HTTP status for this error, including the synthetic 408/503 codes.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Timeout { .. } => Some(SYNTHETIC_TIMEOUT_STATUS),
            Self::NetworkUnavailable(_) => Some(SYNTHETIC_UNAVAILABLE_STATUS),
            _ => self.received_status(),
        }
    }

    /// Status of a response actually received from the network, if any.
    pub fn received_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. }
            | Self::Parse { status, .. }
            | Self::UnsupportedContent { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::NetworkUnavailable(err)
        }
    }
}
