use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use tokio_util::sync::CancellationToken;

use crate::{AnalyticsError, Result};

/// Request body.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON before sending.
    Json(serde_json::Value),
    /// Sent as-is.
    Text(String),
}

impl RequestBody {
    /// Serializes any `Serialize` value into a JSON body.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|err| AnalyticsError::InvalidRequest(format!("unserializable body: {err}")))
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Json(value) => serde_json::to_vec(value).map_err(|err| {
                AnalyticsError::InvalidRequest(format!("unserializable body: {err}"))
            }),
            Self::Text(text) => Ok(text.clone().into_bytes()),
        }
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Per-call request settings.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub method: Method,
    /// Merged over the computed headers; these win on conflict.
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Overrides the client-wide timeout for every attempt of this call.
    pub timeout: Option<Duration>,
    /// Cancels the call, including pending retries.
    pub cancel: Option<CancellationToken>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            cancel: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post(body: impl Into<RequestBody>) -> Self {
        Self::new(Method::POST).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a header. Invalid names or values are rejected.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref()).map_err(|err| {
            AnalyticsError::InvalidRequest(format!("invalid header name '{}': {err}", name.as_ref()))
        })?;
        let value = HeaderValue::try_from(value.as_ref()).map_err(|err| {
            AnalyticsError::InvalidRequest(format!("invalid value for header '{name}': {err}"))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;

    use crate::{AnalyticsError, RequestBody, RequestOptions};

    #[test]
    fn defaults_to_get_without_body() {
        let opts = RequestOptions::default();
        assert_eq!(opts.method, Method::GET);
        assert!(opts.body.is_none());
        assert!(opts.headers.is_empty());
    }

    #[test]
    fn post_carries_body() {
        let opts = RequestOptions::post(json!({"name": "launch"}));
        assert_eq!(opts.method, Method::POST);
        assert_eq!(opts.body, Some(RequestBody::Json(json!({"name": "launch"}))));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let err = RequestOptions::get()
            .with_header("x-bad", "line\nbreak")
            .expect_err("must fail");
        assert!(matches!(err, AnalyticsError::InvalidRequest(_)));
    }

    #[test]
    fn text_body_is_sent_verbatim() {
        let body = RequestBody::from("raw=1");
        assert_eq!(body.to_bytes().expect("must encode"), b"raw=1".to_vec());
    }
}
