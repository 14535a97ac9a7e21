//! `analytics-http` is the async request client of the analytics dashboard.
//!
//! Every backend call goes through [`AnalyticsClient::request`], which
//! handles:
//! - route interception via a pluggable [`RouteInterceptor`]
//! - per-attempt authorization ([`AuthStrategy`], [`CredentialStore`])
//! - timeouts, caller cancellation and bounded retries ([`RetryPolicy`])
//! - response normalization into [`Payload`] or [`AnalyticsError`]
//!
//! Built on top of it:
//! - [`AnalyticsClient::upload`] for multipart uploads with progress
//! - [`AnalyticsClient::get_batch`] for the dashboard fan-out

mod auth;
mod batch;
mod client;
mod error;
mod intercept;
mod normalize;
mod options;
mod request;
mod retry;
mod types;
mod upload;

pub use auth::{
    AuthResolver, AuthStrategy, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    DEFAULT_TOKEN_KEYS, TWA_INIT_DATA_KEY,
};
pub use batch::DateRange;
pub use client::{join_url, AnalyticsClient};
pub use error::{
    AnalyticsError, ErrorKind, SYNTHETIC_TIMEOUT_STATUS, SYNTHETIC_UNAVAILABLE_STATUS,
};
pub use intercept::{InterceptError, NoIntercept, PrefixInterceptor, RouteInterceptor};
pub use normalize::{normalize, SNIPPET_CHARS};
pub use options::ClientOptions;
pub use request::{RequestBody, RequestOptions};
pub use retry::RetryPolicy;
pub use types::{BatchResult, Payload, ResponseEnvelope, UploadProgress};
pub use upload::{
    ProgressCallback, UploadFields, UploadFile, CHANNEL_ID_FIELD, CHUNK_SIZE, FILE_FIELD,
};

pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, AnalyticsError>;
