// # Upload Service - Orchestrator
//
// Thin orchestrator over the focused pieces:
// - transcode: normalizes each file before transfer
// - strategy + transport: pick and run the direct or routed path
// - BatchProgressTracker: aggregate progress events
// - BatchConfirmer: one consolidated save per batch
//
// Batches queue on an mpsc channel and are processed one at a time by a
// single worker task; files within a batch transfer strictly in submission
// order, which is what makes the aggregate progress well-defined.

use crate::config::Config;
use crate::models::{MediaRecord, ObjectRef};
use crate::realtime::RealtimeHandle;
use crate::session::{SessionError, SessionStore};
use crate::transcode;
use crate::upload::confirm::BatchConfirmer;
use crate::upload::progress::BatchProgressTracker;
use crate::upload::strategy::select_strategy;
use crate::upload::transport::{ProgressFn, TransferContext, TransportRouter};
use crate::upload::types::{BatchRequest, UploadEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Why a batch was rejected before any network call.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("batch contains no files")]
    Empty,
    #[error("batch of {count} files exceeds the {max} file limit")]
    TooManyFiles { count: usize, max: usize },
    #[error("event storage quota is exhausted")]
    QuotaExhausted,
    #[error("batch of {bytes} bytes exceeds the remaining quota of {remaining} bytes")]
    QuotaExceeded { bytes: u64, remaining: u64 },
    #[error("no verified session for event {0}")]
    NoSession(String),
    #[error("session cache error: {0}")]
    Session(#[from] SessionError),
    #[error("upload service is not running")]
    ServiceStopped,
}

/// Upload tunables, split out of the full app config.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub direct_upload_ceiling: u64,
    pub max_files_per_batch: usize,
}

impl From<&Config> for UploadConfig {
    fn from(config: &Config) -> Self {
        Self {
            direct_upload_ceiling: config.direct_upload_ceiling,
            max_files_per_batch: config.max_files_per_batch,
        }
    }
}

struct QueuedBatch {
    batch_id: String,
    request: BatchRequest,
}

/// Handle for submitting batches and subscribing to upload events
#[derive(Clone)]
pub struct UploadHandle {
    requests_tx: mpsc::UnboundedSender<QueuedBatch>,
    events: UploadEventBus,
    sessions: SessionStore,
    config: UploadConfig,
}

impl UploadHandle {
    /// Validate and queue a batch.
    ///
    /// Quota and file-count checks run here, against the cached session,
    /// before anything touches the network. They pre-empt obviously futile
    /// uploads; the server re-checks the quota at save time regardless.
    /// Returns the batch id for event subscription.
    pub async fn submit(&self, request: BatchRequest) -> Result<String, BatchError> {
        if request.files.is_empty() {
            return Err(BatchError::Empty);
        }
        if request.files.len() > self.config.max_files_per_batch {
            return Err(BatchError::TooManyFiles {
                count: request.files.len(),
                max: self.config.max_files_per_batch,
            });
        }

        let session = self
            .sessions
            .load(&request.event_code)
            .await?
            .ok_or_else(|| BatchError::NoSession(request.event_code.clone()))?;

        if session.quota_exhausted() {
            return Err(BatchError::QuotaExhausted);
        }

        let bytes = request.total_bytes();
        let remaining = session.remaining_storage();
        if bytes > remaining {
            return Err(BatchError::QuotaExceeded { bytes, remaining });
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        info!(
            "UploadHandle: queued batch {} ({} files, {} bytes)",
            batch_id,
            request.files.len(),
            bytes
        );

        self.requests_tx
            .send(QueuedBatch {
                batch_id: batch_id.clone(),
                request,
            })
            .map_err(|_| BatchError::ServiceStopped)?;

        Ok(batch_id)
    }

    /// Subscribe to events for one batch.
    pub fn subscribe_batch(&self, batch_id: String) -> mpsc::UnboundedReceiver<UploadEvent> {
        self.events.subscribe(EventFilter::Batch(batch_id))
    }

    /// Subscribe to every upload event (view reconcilers use this).
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        self.events.subscribe(EventFilter::All)
    }
}

/// Upload service worker processing queued batches on the shared runtime
pub struct UploadService {
    router: TransportRouter,
    confirmer: Arc<dyn BatchConfirmer>,
    sessions: SessionStore,
    realtime: Option<RealtimeHandle>,
    config: UploadConfig,
    requests_rx: mpsc::UnboundedReceiver<QueuedBatch>,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
}

impl UploadService {
    /// Start the upload worker, returning the handle for submissions.
    pub fn start(
        router: TransportRouter,
        confirmer: Arc<dyn BatchConfirmer>,
        sessions: SessionStore,
        realtime: Option<RealtimeHandle>,
        config: UploadConfig,
    ) -> UploadHandle {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let service = UploadService {
            router,
            confirmer,
            sessions: sessions.clone(),
            realtime,
            config: config.clone(),
            requests_rx,
            events_tx,
        };

        tokio::spawn(service.run());

        UploadHandle {
            requests_tx,
            events: UploadEventBus::new(events_rx),
            sessions,
            config,
        }
    }

    async fn run(mut self) {
        info!("UploadService: worker started");

        while let Some(queued) = self.requests_rx.recv().await {
            self.handle_batch(queued).await;
        }

        info!("UploadService: channel closed, worker exiting");
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn handle_batch(&self, queued: QueuedBatch) {
        let QueuedBatch { batch_id, request } = queued;
        let submitted = request.files.len();

        self.emit(UploadEvent::Started {
            batch_id: batch_id.clone(),
            total_files: submitted,
        });

        // Normalize everything up front so the transfer loop sees final sizes.
        // A file that fails to transcode is skipped, not the whole batch.
        let mut files = Vec::with_capacity(submitted);
        for file in request.files {
            let name = file.name.clone();
            match transcode::normalize(file).await {
                Ok(normalized) => files.push(normalized),
                Err(e) => {
                    warn!("UploadService: transcode of {name} failed: {e}");
                    self.emit(UploadEvent::FileSkipped {
                        batch_id: batch_id.clone(),
                        file_name: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if files.is_empty() {
            self.emit(UploadEvent::Failed {
                batch_id,
                error: "no file in the batch could be prepared for upload".to_string(),
                saved: Vec::new(),
            });
            return;
        }

        let ctx = TransferContext {
            event_code: request.event_code.clone(),
            guest_id: request.guest_id.clone(),
            visibility: request.visibility,
        };

        let tracker =
            BatchProgressTracker::new(batch_id.clone(), files.len(), self.events_tx.clone());

        let mut objects = Vec::with_capacity(files.len());
        let mut transfer_error = None;
        for file in &files {
            let strategy = select_strategy(file, self.config.direct_upload_ceiling);
            let transport = self.router.for_strategy(strategy);

            let progress_tracker = tracker.clone();
            let on_progress: ProgressFn =
                Arc::new(move |percent| progress_tracker.on_file_progress(percent));

            match transport.put(&ctx, file, on_progress).await {
                Ok(object) => {
                    tracker.on_file_complete();
                    objects.push(object);
                }
                Err(e) => {
                    // Remaining queued files are abandoned, but the ones
                    // already in storage still get saved below
                    warn!("UploadService: transfer of {} failed: {e}", file.name);
                    transfer_error = Some(format!("upload of {} failed: {e}", file.name));
                    break;
                }
            }
        }

        if let Some(error) = transfer_error {
            let saved = self.confirm_partial(&ctx, &request.event_code, &objects).await;
            self.emit(UploadEvent::Failed {
                batch_id,
                error,
                saved,
            });
            return;
        }

        let uploaded_bytes: u64 = objects.iter().map(|o| o.file_size).sum();

        let media = match self.confirmer.confirm(&ctx, &objects).await {
            Ok(media) => media,
            Err(e) => {
                // Objects are in storage without records at this point; the
                // origin owns reconciling them
                warn!("UploadService: confirmation failed for batch {batch_id}: {e}");
                self.emit(UploadEvent::Failed {
                    batch_id,
                    error: format!("saving uploaded files failed: {e}"),
                    saved: Vec::new(),
                });
                return;
            }
        };

        self.bump_quota(&request.event_code, uploaded_bytes).await;

        if let Some(realtime) = &self.realtime {
            realtime.announce_batch(&request.event_code, &media);
        }

        info!(
            "UploadService: batch {batch_id} complete ({} records, {uploaded_bytes} bytes)",
            media.len()
        );

        self.emit(UploadEvent::Completed {
            batch_id,
            visibility: request.visibility,
            media,
            uploaded_bytes,
        });
    }

    /// Save whatever transferred before a mid-batch failure so those files
    /// are persisted and shown rather than orphaned in storage.
    async fn confirm_partial(
        &self,
        ctx: &TransferContext,
        event_code: &str,
        objects: &[ObjectRef],
    ) -> Vec<MediaRecord> {
        if objects.is_empty() {
            return Vec::new();
        }

        match self.confirmer.confirm(ctx, objects).await {
            Ok(media) => {
                let uploaded_bytes: u64 = objects.iter().map(|o| o.file_size).sum();
                self.bump_quota(event_code, uploaded_bytes).await;
                if let Some(realtime) = &self.realtime {
                    realtime.announce_batch(event_code, &media);
                }
                info!(
                    "UploadService: saved {} of an interrupted batch",
                    media.len()
                );
                media
            }
            Err(e) => {
                warn!("UploadService: saving partial batch failed: {e}");
                Vec::new()
            }
        }
    }

    /// Optimistic local quota bump; the next verify response overwrites it.
    async fn bump_quota(&self, event_code: &str, uploaded_bytes: u64) {
        match self.sessions.load(event_code).await {
            Ok(Some(mut session)) => {
                session.record_uploaded_bytes(uploaded_bytes);
                if let Err(e) = self.sessions.save(&session).await {
                    warn!("UploadService: failed to persist quota bump: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("UploadService: session read failed after batch: {e}"),
        }
    }
}

type SubscriptionId = u64;

#[derive(Debug, Clone)]
enum EventFilter {
    All,
    Batch(String),
}

impl EventFilter {
    fn matches(&self, event: &UploadEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Batch(batch_id) => event.batch_id() == batch_id,
        }
    }
}

struct Subscription {
    filter: EventFilter,
    tx: mpsc::UnboundedSender<UploadEvent>,
}

/// Fans upload events out to subscribers, dropping subscriptions whose
/// receivers are gone.
#[derive(Clone)]
pub struct UploadEventBus {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl UploadEventBus {
    fn new(mut events_rx: mpsc::UnboundedReceiver<UploadEvent>) -> Self {
        let subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let subscriptions_clone = subscriptions.clone();

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let mut subs = subscriptions_clone.lock().unwrap();
                let mut dropped = Vec::new();

                for (id, subscription) in subs.iter() {
                    if subscription.filter.matches(&event)
                        && subscription.tx.send(event.clone()).is_err()
                    {
                        dropped.push(*id);
                    }
                }

                for id in dropped {
                    subs.remove(&id);
                }
            }
        });

        Self {
            subscriptions,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn subscribe(&self, filter: EventFilter) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .unwrap()
            .insert(id, Subscription { filter, tx });
        rx
    }
}
