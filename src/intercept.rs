//! Pre-dispatch routing hook.
//!
//! A [`RouteInterceptor`] may answer a request before it reaches the network.
//! Declining (`Ok(None)`) or failing hands the request to normal dispatch.

use async_trait::async_trait;
use reqwest::Method;

use crate::{RequestBody, ResponseEnvelope};

/// Error raised by an interceptor. Treated as a decline.
pub type InterceptError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait RouteInterceptor: Send + Sync {
    async fn try_intercept(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&RequestBody>,
    ) -> Result<Option<ResponseEnvelope>, InterceptError>;
}

/// Interceptor that declines every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIntercept;

#[async_trait]
impl RouteInterceptor for NoIntercept {
    async fn try_intercept(
        &self,
        _method: &Method,
        _endpoint: &str,
        _body: Option<&RequestBody>,
    ) -> Result<Option<ResponseEnvelope>, InterceptError> {
        Ok(None)
    }
}

#[derive(Clone, Debug)]
struct PrefixRoute {
    prefix: String,
    method: Option<Method>,
    envelope: ResponseEnvelope,
}

/// Serves fixed envelopes for endpoints starting with a registered prefix.
///
/// Routes are checked in registration order; the first match answers.
#[derive(Clone, Debug, Default)]
pub struct PrefixInterceptor {
    routes: Vec<PrefixRoute>,
}

impl PrefixInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers any method for endpoints starting with `prefix`.
    pub fn route(mut self, prefix: impl Into<String>, envelope: ResponseEnvelope) -> Self {
        self.routes.push(PrefixRoute {
            prefix: prefix.into(),
            method: None,
            envelope,
        });
        self
    }

    /// Answers only `method` requests for endpoints starting with `prefix`.
    pub fn route_method(
        mut self,
        method: Method,
        prefix: impl Into<String>,
        envelope: ResponseEnvelope,
    ) -> Self {
        self.routes.push(PrefixRoute {
            prefix: prefix.into(),
            method: Some(method),
            envelope,
        });
        self
    }

    fn lookup(&self, method: &Method, endpoint: &str) -> Option<&ResponseEnvelope> {
        self.routes
            .iter()
            .find(|route| {
                endpoint.starts_with(&route.prefix)
                    && route.method.as_ref().map_or(true, |m| m == method)
            })
            .map(|route| &route.envelope)
    }
}

#[async_trait]
impl RouteInterceptor for PrefixInterceptor {
    async fn try_intercept(
        &self,
        method: &Method,
        endpoint: &str,
        _body: Option<&RequestBody>,
    ) -> Result<Option<ResponseEnvelope>, InterceptError> {
        Ok(self.lookup(method, endpoint).cloned())
    }
}
