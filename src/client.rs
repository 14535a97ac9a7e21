use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Method,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    auth::CredentialStore, intercept::NoIntercept, normalize, upload::MultipartSource,
    AnalyticsError, AuthResolver, AuthStrategy, ClientOptions, Payload, RequestBody,
    RequestOptions, ResponseEnvelope, Result, RetryPolicy, RouteInterceptor,
};

/// Joins the base address and an endpoint with exactly one `/`.
///
/// Absolute `http://` or `https://` endpoints are returned unchanged.
///
/// Example: `("https://api.example.com/", "/v1/stats")` →
/// `"https://api.example.com/v1/stats"`
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_owned();
    }
    let base = base_url.trim_end_matches('/');
    let path = endpoint.trim_start_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{path}")
    }
}

/// Body prepared for dispatch. Rebuilt into a transport body on every attempt.
pub(crate) enum OutgoingBody {
    Empty,
    Bytes(Bytes),
    Multipart(MultipartSource),
}

/// One logical request, shared by all of its attempts.
pub(crate) struct Call<'a> {
    pub(crate) method: Method,
    pub(crate) endpoint: &'a str,
    pub(crate) headers: HeaderMap,
    pub(crate) body: OutgoingBody,
    /// Original body, shown to the route interceptor.
    pub(crate) source_body: Option<&'a RequestBody>,
    pub(crate) timeout: Duration,
    pub(crate) cancel: Option<CancellationToken>,
}

/// Request client for the analytics backend.
///
/// Cheap to clone; clones share the connection pool, credential stores and
/// interceptor.
#[derive(Clone)]
pub struct AnalyticsClient {
    http: reqwest::Client,
    options: ClientOptions,
    auth: AuthResolver,
    interceptor: Arc<dyn RouteInterceptor>,
}

impl fmt::Debug for AnalyticsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsClient")
            .field("options", &self.options)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl AnalyticsClient {
    /// Creates a client with empty in-memory credential stores and no
    /// route interceptor.
    pub fn new(options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| AnalyticsError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            options,
            auth: AuthResolver::default(),
            interceptor: Arc::new(NoIntercept),
        })
    }

    /// Creates a client from `ANALYTICS_*` environment variables.
    ///
    /// See [`ClientOptions::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(ClientOptions::from_env()?)
    }

    pub fn with_auth_resolver(mut self, auth: AuthResolver) -> Self {
        self.auth = auth;
        self
    }

    /// Reads credentials from the given persistent and session stores using
    /// the default key order.
    pub fn with_credential_stores(
        self,
        persistent: Arc<dyn CredentialStore>,
        session: Arc<dyn CredentialStore>,
    ) -> Self {
        self.with_auth_resolver(AuthResolver::new(persistent, session))
    }

    pub fn with_interceptor(mut self, interceptor: impl RouteInterceptor + 'static) -> Self {
        self.interceptor = Arc::new(interceptor);
        self
    }

    /// Uses a preconfigured `reqwest` client (proxies, TLS roots, ...).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_auth_strategy(mut self, strategy: AuthStrategy) -> Self {
        self.options.auth_strategy = strategy;
        self
    }

    /// Switches the auth strategy for subsequent attempts made through this
    /// value. Clones already handed to other tasks keep their own strategy.
    pub fn set_auth_strategy(&mut self, strategy: AuthStrategy) {
        self.options.auth_strategy = strategy;
    }

    pub fn auth_strategy(&self) -> AuthStrategy {
        self.options.auth_strategy
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        join_url(&self.options.base_url, endpoint)
    }

    /// Executes a request: route interception, auth, timed dispatch,
    /// normalization and retries.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Payload> {
        let body = match &options.body {
            Some(body) if options.method != Method::GET => {
                OutgoingBody::Bytes(body.to_bytes()?.into())
            }
            _ => OutgoingBody::Empty,
        };
        let call = Call {
            method: options.method,
            endpoint,
            headers: options.headers,
            body,
            source_body: options.body.as_ref(),
            timeout: options.timeout.unwrap_or_else(|| self.options.timeout()),
            cancel: options.cancel,
        };
        self.execute(call).await
    }

    /// Like [`AnalyticsClient::request`], decoding the payload into `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.request(endpoint, options).await?.decode()
    }

    /// Like [`AnalyticsClient::request`], folding failures into
    /// [`ResponseEnvelope::Failure`].
    pub async fn request_envelope(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ResponseEnvelope {
        ResponseEnvelope::from(self.request(endpoint, options).await)
    }

    pub async fn get(&self, endpoint: &str) -> Result<Payload> {
        self.request(endpoint, RequestOptions::get()).await
    }

    pub async fn post(&self, endpoint: &str, body: impl Into<RequestBody>) -> Result<Payload> {
        self.request(endpoint, RequestOptions::post(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: impl Into<RequestBody>) -> Result<Payload> {
        self.request(endpoint, RequestOptions::new(Method::PUT).with_body(body))
            .await
    }

    pub async fn patch(&self, endpoint: &str, body: impl Into<RequestBody>) -> Result<Payload> {
        self.request(endpoint, RequestOptions::new(Method::PATCH).with_body(body))
            .await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Payload> {
        self.request(endpoint, RequestOptions::new(Method::DELETE)).await
    }

    pub(crate) async fn execute(&self, call: Call<'_>) -> Result<Payload> {
        if let Some(envelope) = self.intercept(&call).await {
            return envelope.into_result();
        }

        let policy = RetryPolicy::from_options(&self.options);
        let mut attempt = 1u32;
        loop {
            let err = match self.attempt(&call).await {
                Ok(payload) => return Ok(payload),
                Err(err) => err,
            };
            if !policy.should_retry(&err, attempt) {
                return Err(err);
            }

            let delay = policy.next_delay(attempt);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                endpoint = call.endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying request"
            );
            wait_before_retry(delay, call.cancel.as_ref()).await?;
            attempt += 1;
        }
    }

    async fn intercept(&self, call: &Call<'_>) -> Option<ResponseEnvelope> {
        match self
            .interceptor
            .try_intercept(&call.method, call.endpoint, call.source_body)
            .await
        {
            Ok(Some(envelope)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = call.endpoint, "request served by route interceptor");
                Some(envelope)
            }
            Ok(None) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = call.endpoint, "route interceptor declined");
                None
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    endpoint = call.endpoint,
                    error = %err,
                    "route interceptor failed; dispatching directly"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = err;
                None
            }
        }
    }

    /// Runs one attempt. The timer and the exchange are dropped together
    /// whichever branch completes first.
    async fn attempt(&self, call: &Call<'_>) -> Result<Payload> {
        let cancel = call.cancel.as_ref();
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(AnalyticsError::Cancelled);
        }

        let request = self.build_request(call)?;
        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(AnalyticsError::from_transport)?;
            normalize::read_response(response).await
        };

        tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(AnalyticsError::Cancelled),
            _ = tokio::time::sleep(call.timeout) => Err(AnalyticsError::Timeout {
                timeout_ms: call.timeout.as_millis() as u64,
            }),
            result = exchange => result,
        }
    }

    fn build_request(&self, call: &Call<'_>) -> Result<reqwest::RequestBuilder> {
        let builder = self
            .http
            .request(call.method.clone(), self.url_for(call.endpoint))
            .headers(self.request_headers(call));

        Ok(match &call.body {
            OutgoingBody::Empty => builder,
            OutgoingBody::Bytes(bytes) => builder.body(bytes.clone()),
            OutgoingBody::Multipart(source) => builder.multipart(source.form()?),
        })
    }

    /// Headers for one attempt: JSON content type (except multipart), then
    /// freshly computed auth, then the caller's headers.
    fn request_headers(&self, call: &Call<'_>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if !matches!(call.body, OutgoingBody::Multipart(_)) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers.extend(self.auth.compute_headers(self.options.auth_strategy));
        headers.extend(call.headers.clone());
        headers
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Sleeps between attempts; the caller's token cuts the wait short.
async fn wait_before_retry(delay: Duration, cancel: Option<&CancellationToken>) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(AnalyticsError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
