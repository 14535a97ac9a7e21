//! Multipart uploads with progress reporting.
//!
//! The file part is streamed to the transport in [`CHUNK_SIZE`] pieces and a
//! progress event is emitted as each piece is pulled, so the callback sees
//! real transfer progress rather than a single completion event.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Body, Method,
};

use crate::{
    client::{Call, OutgoingBody},
    AnalyticsClient, AnalyticsError, Payload, RequestOptions, Result, UploadProgress,
};

/// Multipart field carrying the binary payload.
pub const FILE_FIELD: &str = "file";
/// Multipart field carrying the target channel.
pub const CHANNEL_ID_FIELD: &str = "channel_id";
/// Size of the pieces the file part is streamed in.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Callback receiving upload progress events.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// File to upload.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    /// Creates a file with the `application/octet-stream` MIME type.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: "application/octet-stream".to_owned(),
            bytes: bytes.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Reads a file from disk, naming the part after the file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            AnalyticsError::InvalidRequest(format!("cannot read '{}': {err}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_owned());
        Ok(Self::new(file_name, bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Text fields sent next to the file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadFields {
    channel_id: Option<String>,
    extra: Vec<(String, String)>,
}

impl UploadFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `channel_id` field; numeric ids are sent as strings.
    pub fn channel_id(mut self, channel_id: impl ToString) -> Self {
        self.channel_id = Some(channel_id.to_string());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    pub fn channel_id_value(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }
}

/// Tracks bytes handed to the transport and forwards events to the callback.
#[derive(Clone)]
pub(crate) struct ProgressReporter {
    callback: ProgressCallback,
    loaded: Arc<AtomicU64>,
    total: u64,
}

impl ProgressReporter {
    pub(crate) fn new(callback: ProgressCallback, total: u64) -> Self {
        Self {
            callback,
            loaded: Arc::new(AtomicU64::new(0)),
            total,
        }
    }

    fn start(&self) {
        self.loaded.store(0, Ordering::SeqCst);
        (self.callback)(UploadProgress {
            loaded: 0,
            total: self.total,
            progress: 0,
            error: None,
        });
    }

    /// Called when an attempt starts streaming. A retry resets progress with
    /// a fresh 0% event.
    fn restart(&self) {
        if self.loaded.swap(0, Ordering::SeqCst) > 0 {
            (self.callback)(UploadProgress::in_flight(0, self.total));
        }
    }

    fn advance(&self, loaded: u64) {
        self.loaded.store(loaded, Ordering::SeqCst);
        (self.callback)(UploadProgress::in_flight(loaded, self.total));
    }

    fn complete(&self) {
        (self.callback)(UploadProgress::at(self.total, self.total));
    }

    fn fail(&self, err: &AnalyticsError) {
        let loaded = self.loaded.load(Ordering::SeqCst);
        (self.callback)(UploadProgress::failed(loaded, self.total, err.to_string()));
    }
}

/// Everything needed to rebuild the multipart form for each attempt.
pub(crate) struct MultipartSource {
    file: UploadFile,
    fields: UploadFields,
    reporter: ProgressReporter,
}

impl MultipartSource {
    pub(crate) fn new(file: UploadFile, fields: UploadFields, callback: ProgressCallback) -> Self {
        let reporter = ProgressReporter::new(callback, file.len());
        Self {
            file,
            fields,
            reporter,
        }
    }

    /// Builds the form for one attempt.
    pub(crate) fn form(&self) -> Result<Form> {
        self.reporter.restart();
        let part = Part::stream_with_length(self.file_body(), self.file.len())
            .file_name(self.file.file_name.clone())
            .mime_str(&self.file.mime_type)
            .map_err(|err| {
                AnalyticsError::InvalidRequest(format!(
                    "invalid MIME type '{}': {err}",
                    self.file.mime_type
                ))
            })?;

        let mut form = Form::new().part(FILE_FIELD, part);
        if let Some(channel_id) = &self.fields.channel_id {
            form = form.text(CHANNEL_ID_FIELD, channel_id.clone());
        }
        for (name, value) in &self.fields.extra {
            form = form.text(name.clone(), value.clone());
        }
        Ok(form)
    }

    /// Streams the file in chunks, reporting each chunk when it is pulled.
    fn file_body(&self) -> Body {
        let bytes = self.file.bytes.clone();
        let reporter = self.reporter.clone();
        let chunks = bytes.len().div_ceil(CHUNK_SIZE);
        let stream = futures_util::stream::iter((0..chunks).map(move |index| {
            let start = index * CHUNK_SIZE;
            let end = (start + CHUNK_SIZE).min(bytes.len());
            reporter.advance(end as u64);
            Ok::<Bytes, std::io::Error>(bytes.slice(start..end))
        }));
        Body::wrap_stream(stream)
    }
}

impl AnalyticsClient {
    /// Uploads a file as `multipart/form-data`.
    ///
    /// The request carries auth headers but no explicit `Content-Type`, so
    /// the transport sets the multipart boundary. `on_progress` receives a
    /// 0% event, one event per chunk sent, and finally either a completion
    /// event or an event carrying the error. Only the completion event
    /// reports 100%; a retried attempt restarts from a 0% event.
    pub async fn upload<F>(
        &self,
        endpoint: &str,
        file: UploadFile,
        fields: UploadFields,
        on_progress: F,
    ) -> Result<Payload>
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        let options = RequestOptions::new(Method::POST);
        self.upload_with(endpoint, file, fields, options, on_progress)
            .await
    }

    /// Like [`AnalyticsClient::upload`], with per-call headers, timeout and
    /// cancellation taken from `options`.
    ///
    /// The request is always a `POST`; the method and body of `options` are
    /// ignored, and so is any caller `Content-Type`.
    pub async fn upload_with<F>(
        &self,
        endpoint: &str,
        file: UploadFile,
        fields: UploadFields,
        options: RequestOptions,
        on_progress: F,
    ) -> Result<Payload>
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        let source = MultipartSource::new(file, fields, Arc::new(on_progress));
        let reporter = source.reporter.clone();
        reporter.start();

        let mut headers = options.headers;
        headers.remove(CONTENT_TYPE);
        let call = Call {
            method: Method::POST,
            endpoint,
            headers,
            body: OutgoingBody::Multipart(source),
            source_body: None,
            timeout: options.timeout.unwrap_or_else(|| self.options().timeout()),
            cancel: options.cancel,
        };

        match self.execute(call).await {
            Ok(payload) => {
                reporter.complete();
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint, bytes = reporter.total, "upload completed");
                Ok(payload)
            }
            Err(err) => {
                reporter.fail(&err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{MultipartSource, ProgressReporter, UploadFields, UploadFile, CHUNK_SIZE};
    use crate::{AnalyticsError, UploadProgress};

    fn recorder() -> (Arc<Mutex<Vec<UploadProgress>>>, super::ProgressCallback) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: super::ProgressCallback = Arc::new(move |event: UploadProgress| {
            sink.lock().expect("events mutex must not be poisoned").push(event);
        });
        (events, callback)
    }

    #[test]
    fn channel_id_is_string_coerced() {
        let fields = UploadFields::new().channel_id(-1001234567890_i64);
        assert_eq!(fields.channel_id_value(), Some("-1001234567890"));
    }

    #[test]
    fn reporter_emits_start_progress_and_failure() {
        let (events, callback) = recorder();
        let reporter = ProgressReporter::new(callback, 200);
        reporter.start();
        reporter.advance(100);
        reporter.fail(&AnalyticsError::Timeout { timeout_ms: 5 });

        let events = events.lock().expect("events mutex must not be poisoned");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].progress, 0);
        assert_eq!(events[1].progress, 50);
        assert_eq!(events[2].loaded, 100);
        assert!(events[2].error.as_deref().is_some_and(|e| e.contains("timed out")));
    }

    #[test]
    fn retried_attempt_restarts_and_only_completion_reaches_100() {
        let (events, callback) = recorder();
        let reporter = ProgressReporter::new(callback, 200);
        reporter.start();
        reporter.restart();
        reporter.advance(100);
        reporter.advance(200);
        reporter.restart();
        reporter.advance(100);
        reporter.advance(200);
        reporter.complete();

        let events = events.lock().expect("events mutex must not be poisoned");
        let seen: Vec<_> = events.iter().map(|e| (e.loaded, e.progress)).collect();
        assert_eq!(
            seen,
            [(0, 0), (100, 50), (200, 99), (0, 0), (100, 50), (200, 99), (200, 100)]
        );
        assert_eq!(events.iter().filter(|e| e.is_complete()).count(), 1);
    }

    #[test]
    fn form_builds_for_large_files() {
        let (_, callback) = recorder();
        let file = UploadFile::new("clip.mp4", vec![7u8; CHUNK_SIZE * 2 + 10])
            .with_mime_type("video/mp4");
        let source = MultipartSource::new(file, UploadFields::new().channel_id(5), callback);
        assert!(source.form().is_ok());
    }

    #[test]
    fn invalid_mime_type_is_rejected() {
        let (_, callback) = recorder();
        let file = UploadFile::new("x.bin", vec![1]).with_mime_type("not a mime");
        let source = MultipartSource::new(file, UploadFields::new(), callback);
        assert!(matches!(
            source.form(),
            Err(AnalyticsError::InvalidRequest(_))
        ));
    }
}
