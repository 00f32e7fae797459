use crate::api::{ApiClient, ApiError};
use crate::models::{ObjectRef, Visibility};
use crate::upload::UploadFile;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Per-file progress callback, called with 0..=100.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("credential request failed: {0}")]
    Credential(#[source] ApiError),
    #[error("storage write failed: {0}")]
    StorageWrite(#[from] reqwest::Error),
    #[error("storage write rejected with status {status}")]
    StorageStatus { status: reqwest::StatusCode },
    #[error("routed upload failed: {0}")]
    Routed(#[source] ApiError),
    #[error("routed upload returned no object reference")]
    MissingObjectRef,
}

/// Batch-level coordinates every transfer needs.
#[derive(Debug, Clone)]
pub struct TransferContext {
    pub event_code: String,
    pub guest_id: String,
    pub visibility: Visibility,
}

/// A way to move one file's bytes into object storage.
///
/// Both paths present the same contract: bytes go in, an [`ObjectRef`] comes
/// out, progress ticks along the way. Callers past strategy selection never
/// know which path ran.
#[async_trait::async_trait]
pub trait ObjectTransport: Send + Sync {
    async fn put(
        &self,
        ctx: &TransferContext,
        file: &UploadFile,
        on_progress: ProgressFn,
    ) -> Result<ObjectRef, TransferError>;
}

/// Granularity of upload progress reporting.
const PROGRESS_CHUNK: usize = 64 * 1024;

/// Slice file bytes into progress-sized chunks, each tagged with the
/// cumulative percentage once it has been sent.
fn progress_chunks(data: &Bytes) -> Vec<(Bytes, u8)> {
    let total = data.len() as u64;
    let mut chunks = Vec::new();
    let mut sent = 0u64;
    let mut offset = 0usize;

    while offset < data.len() {
        let end = (offset + PROGRESS_CHUNK).min(data.len());
        let chunk = data.slice(offset..end);
        sent += chunk.len() as u64;
        let percent = ((sent as f64 / total as f64) * 100.0).floor() as u8;
        chunks.push((chunk, percent));
        offset = end;
    }

    chunks
}

/// Wrap file bytes in a streaming body that reports cumulative percentage as
/// chunks are handed to the HTTP machinery.
fn progress_body(data: Bytes, on_progress: ProgressFn) -> reqwest::Body {
    let stream = futures::stream::iter(progress_chunks(&data).into_iter().map(
        move |(chunk, percent)| {
            on_progress(percent);
            Ok::<Bytes, std::io::Error>(chunk)
        },
    ));

    reqwest::Body::wrap_stream(stream)
}

/// Direct path: fetch a signed write credential from the origin, then PUT the
/// body straight to the storage endpoint it names.
pub struct DirectTransport {
    api: ApiClient,
}

impl DirectTransport {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ObjectTransport for DirectTransport {
    async fn put(
        &self,
        ctx: &TransferContext,
        file: &UploadFile,
        on_progress: ProgressFn,
    ) -> Result<ObjectRef, TransferError> {
        debug!(
            "DirectTransport: requesting credential for {} ({} bytes)",
            file.name,
            file.size()
        );

        let credential = self
            .api
            .presigned_url(&ctx.event_code, &ctx.guest_id, &file.name, &file.content_type)
            .await
            .map_err(TransferError::Credential)?;

        let size = file.size();
        let response = self
            .api
            .client()
            .put(&credential.url)
            .header(CONTENT_TYPE, &file.content_type)
            .header(CONTENT_LENGTH, size)
            .body(progress_body(file.data.clone(), on_progress.clone()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::StorageStatus { status });
        }

        on_progress(100);
        info!("DirectTransport: stored {} as {}", file.name, credential.key);

        Ok(ObjectRef {
            public_url: credential.public_url,
            s3_key: credential.key,
            file_size: size,
        })
    }
}

/// Routed path: multipart POST through the origin, which performs the storage
/// write itself and returns the resulting object URL.
pub struct RoutedTransport {
    api: ApiClient,
}

impl RoutedTransport {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ObjectTransport for RoutedTransport {
    async fn put(
        &self,
        ctx: &TransferContext,
        file: &UploadFile,
        on_progress: ProgressFn,
    ) -> Result<ObjectRef, TransferError> {
        debug!(
            "RoutedTransport: uploading {} ({} bytes) through origin",
            file.name,
            file.size()
        );

        let size = file.size();
        let part = reqwest::multipart::Part::stream_with_length(
            progress_body(file.data.clone(), on_progress.clone()),
            size,
        )
        .file_name(file.name.clone())
        .mime_str(&file.content_type)
        .map_err(TransferError::StorageWrite)?;

        let form = reqwest::multipart::Form::new().part("media", part);

        let url = self.api.build_url(&format!(
            "/photos/upload/{}/{}",
            urlencoding::encode(&ctx.event_code),
            urlencoding::encode(&ctx.guest_id)
        ));

        let response = self
            .api
            .client()
            .post(&url)
            .query(&[("isPrivate", ctx.visibility.is_private().to_string())])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransferError::Routed(ApiError::Status { status, message }));
        }

        let body: crate::api::RoutedUploadResponse =
            response.json().await.map_err(TransferError::StorageWrite)?;

        let photo = body.photos.first().ok_or(TransferError::MissingObjectRef)?;

        on_progress(100);
        info!("RoutedTransport: origin stored {}", file.name);

        Ok(ObjectRef {
            public_url: photo.url.clone(),
            s3_key: object_key_from_url(&photo.url),
            file_size: size,
        })
    }
}

/// Recover the storage key from a public object URL. Bucket URLs embed the key
/// after the host; anything unparseable falls back to the full URL so the save
/// endpoint can still correlate the object.
pub fn object_key_from_url(url: &str) -> String {
    if let Some((_, key)) = url.split_once(".amazonaws.com/") {
        return key.to_string();
    }
    if let Some((_, rest)) = url.split_once("://") {
        if let Some((_, path)) = rest.split_once('/') {
            return path.to_string();
        }
    }
    url.to_string()
}

/// Resolves a strategy to the transport that executes it.
#[derive(Clone)]
pub struct TransportRouter {
    direct: Arc<dyn ObjectTransport>,
    routed: Arc<dyn ObjectTransport>,
}

impl TransportRouter {
    pub fn new(direct: Arc<dyn ObjectTransport>, routed: Arc<dyn ObjectTransport>) -> Self {
        Self { direct, routed }
    }

    pub fn from_api(api: &ApiClient) -> Self {
        Self::new(
            Arc::new(DirectTransport::new(api.clone())),
            Arc::new(RoutedTransport::new(api.clone())),
        )
    }

    pub fn for_strategy(&self, strategy: crate::upload::Strategy) -> &Arc<dyn ObjectTransport> {
        match strategy {
            crate::upload::Strategy::Direct => &self.direct,
            crate::upload::Strategy::Routed => &self.routed,
        }
    }
}

pub mod mock {
    //! Instrumented transport for tests: records call order, emits scripted
    //! progress ticks, and can be told to fail on the nth file.

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockTransport {
        label: String,
        calls: Arc<Mutex<Vec<String>>>,
        in_flight: AtomicBool,
        seen: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    impl MockTransport {
        pub fn new(label: &str, calls: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                label: label.to_string(),
                calls,
                in_flight: AtomicBool::new(false),
                seen: AtomicUsize::new(0),
                fail_on_call: None,
            }
        }

        /// Fail the nth put on this transport (0-based).
        pub fn failing_on(mut self, call: usize) -> Self {
            self.fail_on_call = Some(call);
            self
        }
    }

    #[async_trait::async_trait]
    impl ObjectTransport for MockTransport {
        async fn put(
            &self,
            _ctx: &TransferContext,
            file: &UploadFile,
            on_progress: ProgressFn,
        ) -> Result<ObjectRef, TransferError> {
            // Overlapping puts on the same transport violate the sequential
            // batch contract; make that loud.
            assert!(
                !self.in_flight.swap(true, Ordering::SeqCst),
                "overlapping transfer detected"
            );

            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:start:{}", self.label, file.name));

            let call = self.seen.fetch_add(1, Ordering::SeqCst);

            for percent in [0u8, 50, 100] {
                on_progress(percent);
                tokio::task::yield_now().await;
            }

            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:end:{}", self.label, file.name));
            self.in_flight.store(false, Ordering::SeqCst);

            if self.fail_on_call == Some(call) {
                return Err(TransferError::StorageStatus {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                });
            }

            Ok(ObjectRef {
                public_url: format!("https://bucket.s3.amazonaws.com/{}", file.name),
                s3_key: file.name.clone(),
                file_size: file.size(),
            })
        }
    }
}
