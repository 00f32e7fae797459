// # Guest Gallery - Partition Views and Reconciliation
//
// The guest dashboard shows three partitions: "mine" (everything this guest
// uploaded), "private" (this guest's private uploads), and "public" (all
// public uploads for the event). Each partition is refreshed wholesale from
// its own endpoint; reconciliation decides WHICH partitions an event touches,
// never patches entries in place. Replaying an event is therefore idempotent.
//
// The partial-refresh rules keep network traffic bounded during a busy
// event: a private upload touches {private, mine}, a public upload touches
// {public, mine}, a deletion touches its source partition plus {mine}. Only
// a resync after a dropped connection refreshes everything.

use crate::api::{ApiClient, ApiError};
use crate::models::{MediaRecord, Visibility};
use crate::realtime::{RealtimeEvent, ServerEvent};
use crate::upload::UploadEvent;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// One of the three guest-facing photo views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Mine,
    Private,
    Public,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Mine, Partition::Private, Partition::Public];

    /// Partitions an upload with the given visibility can have changed.
    pub fn touched_by_upload(visibility: Visibility) -> [Partition; 2] {
        match visibility {
            Visibility::Private => [Partition::Private, Partition::Mine],
            Visibility::Public => [Partition::Public, Partition::Mine],
        }
    }
}

/// Read/delete seam between the gallery view and the origin.
#[async_trait::async_trait]
pub trait GalleryBackend: Send + Sync {
    async fn fetch(
        &self,
        event_code: &str,
        guest_id: &str,
        partition: Partition,
    ) -> Result<Vec<MediaRecord>, ApiError>;

    async fn delete(
        &self,
        event_code: &str,
        guest_id: &str,
        photo_id: &str,
    ) -> Result<(), ApiError>;
}

/// Production backend: each partition maps to its own endpoint.
pub struct ApiGalleryBackend {
    api: ApiClient,
}

impl ApiGalleryBackend {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl GalleryBackend for ApiGalleryBackend {
    async fn fetch(
        &self,
        event_code: &str,
        guest_id: &str,
        partition: Partition,
    ) -> Result<Vec<MediaRecord>, ApiError> {
        match partition {
            Partition::Mine => self.api.guest_photos(event_code, guest_id).await,
            Partition::Private => self.api.private_photos(event_code, guest_id).await,
            Partition::Public => self.api.public_gallery(event_code).await,
        }
    }

    async fn delete(
        &self,
        event_code: &str,
        guest_id: &str,
        photo_id: &str,
    ) -> Result<(), ApiError> {
        self.api.delete_photo(event_code, guest_id, photo_id).await
    }
}

#[derive(Default)]
struct GalleryState {
    mine: Vec<MediaRecord>,
    private: Vec<MediaRecord>,
    public: Vec<MediaRecord>,
    messages: Vec<String>,
}

impl GalleryState {
    fn partition_mut(&mut self, partition: Partition) -> &mut Vec<MediaRecord> {
        match partition {
            Partition::Mine => &mut self.mine,
            Partition::Private => &mut self.private,
            Partition::Public => &mut self.public,
        }
    }

    fn partition(&self, partition: Partition) -> &Vec<MediaRecord> {
        match partition {
            Partition::Mine => &self.mine,
            Partition::Private => &self.private,
            Partition::Public => &self.public,
        }
    }
}

/// Guest dashboard state. Clones share state; fetches happen outside the
/// lock, so a slow endpoint never blocks reads.
#[derive(Clone)]
pub struct GuestGalleryView {
    event_code: String,
    guest_id: String,
    backend: Arc<dyn GalleryBackend>,
    state: Arc<Mutex<GalleryState>>,
}

impl GuestGalleryView {
    pub fn new(event_code: String, guest_id: String, backend: Arc<dyn GalleryBackend>) -> Self {
        Self {
            event_code,
            guest_id,
            backend,
            state: Arc::new(Mutex::new(GalleryState::default())),
        }
    }

    /// Current contents of one partition.
    pub fn partition(&self, partition: Partition) -> Vec<MediaRecord> {
        self.state.lock().unwrap().partition(partition).clone()
    }

    /// This guest's own messages, as last reconciled.
    pub fn messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn set_messages(&self, messages: Vec<String>) {
        self.state.lock().unwrap().messages = messages;
    }

    /// Re-fetch the named partitions, replacing their contents wholesale.
    pub async fn refresh(&self, partitions: &[Partition]) -> Result<(), ApiError> {
        for &partition in partitions {
            let records = self
                .backend
                .fetch(&self.event_code, &self.guest_id, partition)
                .await?;
            debug!(
                "Gallery: refreshed {partition:?} for {} ({} records)",
                self.event_code,
                records.len()
            );
            *self.state.lock().unwrap().partition_mut(partition) = records;
        }
        Ok(())
    }

    pub async fn refresh_all(&self) -> Result<(), ApiError> {
        self.refresh(&Partition::ALL).await
    }

    /// Delete one of this guest's photos, then refresh the partition it was
    /// shown in plus {mine}.
    pub async fn delete_photo(
        &self,
        partition: Partition,
        photo_id: &str,
    ) -> Result<(), ApiError> {
        self.backend
            .delete(&self.event_code, &self.guest_id, photo_id)
            .await?;
        info!("Gallery: deleted {photo_id} from {partition:?}");
        self.refresh(&[partition, Partition::Mine]).await
    }

    /// Reconcile one locally observed upload event. A failed batch may still
    /// have persisted its leading files; those refresh like a completed one.
    pub async fn apply_upload_event(&self, event: &UploadEvent) -> Result<(), ApiError> {
        match event {
            UploadEvent::Completed { visibility, .. } => {
                self.refresh(&Partition::touched_by_upload(*visibility))
                    .await?;
            }
            UploadEvent::Failed { saved, .. } if !saved.is_empty() => {
                match saved.first().and_then(|m| m.visibility) {
                    Some(visibility) => {
                        self.refresh(&Partition::touched_by_upload(visibility)).await?
                    }
                    None => self.refresh_all().await?,
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Reconcile one fan-out event from the realtime channel.
    pub async fn apply_realtime_event(&self, event: &RealtimeEvent) -> Result<(), ApiError> {
        match event {
            RealtimeEvent::Server(ServerEvent::PhotoUploaded { event_code, .. }) => {
                if event_code == &self.event_code {
                    // A remote guest's private uploads are invisible here, so
                    // only the shared partition can have changed
                    self.refresh(&[Partition::Public]).await?;
                }
            }
            RealtimeEvent::Server(ServerEvent::NewMessage {
                guest_id, message, ..
            }) => {
                if guest_id == &self.guest_id {
                    self.state.lock().unwrap().messages.push(message.clone());
                }
            }
            RealtimeEvent::Server(ServerEvent::MessageDeleted { guest_id, text }) => {
                if guest_id == &self.guest_id {
                    let mut state = self.state.lock().unwrap();
                    if let Some(pos) = state.messages.iter().position(|m| m == text) {
                        state.messages.remove(pos);
                    }
                }
            }
            RealtimeEvent::Resynced => {
                // Events sent while disconnected were lost; one full re-fetch
                self.refresh_all().await?;
            }
            RealtimeEvent::ConnectionLost => {}
        }
        Ok(())
    }

    /// Drive reconciliation from both event sources until they close.
    pub async fn run(
        self,
        mut realtime_rx: broadcast::Receiver<RealtimeEvent>,
        mut uploads_rx: mpsc::UnboundedReceiver<UploadEvent>,
    ) {
        loop {
            tokio::select! {
                event = realtime_rx.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = self.apply_realtime_event(&event).await {
                            warn!("Gallery: refresh after realtime event failed: {e}");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Gallery: dropped {n} realtime events, refreshing everything");
                        if let Err(e) = self.refresh_all().await {
                            warn!("Gallery: full refresh failed: {e}");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = uploads_rx.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.apply_upload_event(&event).await {
                            warn!("Gallery: refresh after upload failed: {e}");
                        }
                    }
                    None => break,
                },
            }
        }

        info!("Gallery: reconcile loop for {} finished", self.event_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;
    use std::collections::HashMap;

    struct CountingBackend {
        fetches: Mutex<HashMap<Partition, usize>>,
        records: Vec<MediaRecord>,
    }

    impl CountingBackend {
        fn new(records: Vec<MediaRecord>) -> Self {
            Self {
                fetches: Mutex::new(HashMap::new()),
                records,
            }
        }

        fn count(&self, partition: Partition) -> usize {
            *self.fetches.lock().unwrap().get(&partition).unwrap_or(&0)
        }
    }

    #[async_trait::async_trait]
    impl GalleryBackend for CountingBackend {
        async fn fetch(
            &self,
            _event_code: &str,
            _guest_id: &str,
            partition: Partition,
        ) -> Result<Vec<MediaRecord>, ApiError> {
            *self.fetches.lock().unwrap().entry(partition).or_insert(0) += 1;
            Ok(self.records.clone())
        }

        async fn delete(
            &self,
            _event_code: &str,
            _guest_id: &str,
            _photo_id: &str,
        ) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn record(id: &str) -> MediaRecord {
        MediaRecord {
            id: id.to_string(),
            url: format!("https://x/{id}.webp"),
            kind: MediaKind::Image,
            owner_guest_id: Some("g1".to_string()),
            visibility: Some(Visibility::Public),
        }
    }

    fn view(backend: Arc<CountingBackend>) -> GuestGalleryView {
        GuestGalleryView::new("EV1".to_string(), "g1".to_string(), backend)
    }

    #[tokio::test]
    async fn private_upload_refreshes_private_and_mine_only() {
        let backend = Arc::new(CountingBackend::new(vec![record("p1")]));
        let gallery = view(backend.clone());

        gallery
            .apply_upload_event(&UploadEvent::Completed {
                batch_id: "b1".to_string(),
                visibility: Visibility::Private,
                media: vec![record("p1")],
                uploaded_bytes: 100,
            })
            .await
            .unwrap();

        assert_eq!(backend.count(Partition::Private), 1);
        assert_eq!(backend.count(Partition::Mine), 1);
        assert_eq!(backend.count(Partition::Public), 0);
    }

    #[tokio::test]
    async fn public_upload_refreshes_public_and_mine_only() {
        let backend = Arc::new(CountingBackend::new(vec![record("p1")]));
        let gallery = view(backend.clone());

        gallery
            .apply_upload_event(&UploadEvent::Completed {
                batch_id: "b1".to_string(),
                visibility: Visibility::Public,
                media: vec![record("p1")],
                uploaded_bytes: 100,
            })
            .await
            .unwrap();

        assert_eq!(backend.count(Partition::Public), 1);
        assert_eq!(backend.count(Partition::Mine), 1);
        assert_eq!(backend.count(Partition::Private), 0);
    }

    #[tokio::test]
    async fn failed_batch_with_saved_files_still_refreshes() {
        let backend = Arc::new(CountingBackend::new(vec![record("p1")]));
        let gallery = view(backend.clone());

        gallery
            .apply_upload_event(&UploadEvent::Failed {
                batch_id: "b1".to_string(),
                error: "upload of clip.mp4 failed".to_string(),
                saved: vec![record("p1")],
            })
            .await
            .unwrap();

        assert_eq!(backend.count(Partition::Public), 1);
        assert_eq!(backend.count(Partition::Mine), 1);
        assert_eq!(backend.count(Partition::Private), 0);
    }

    #[tokio::test]
    async fn failed_batch_with_nothing_saved_fetches_nothing() {
        let backend = Arc::new(CountingBackend::new(Vec::new()));
        let gallery = view(backend.clone());

        gallery
            .apply_upload_event(&UploadEvent::Failed {
                batch_id: "b1".to_string(),
                error: "upload of clip.mp4 failed".to_string(),
                saved: Vec::new(),
            })
            .await
            .unwrap();

        for partition in Partition::ALL {
            assert_eq!(backend.count(partition), 0, "{partition:?}");
        }
    }

    #[tokio::test]
    async fn replayed_remote_upload_does_not_duplicate() {
        let backend = Arc::new(CountingBackend::new(vec![record("p1"), record("p2")]));
        let gallery = view(backend.clone());

        let event = RealtimeEvent::Server(ServerEvent::PhotoUploaded {
            event_code: "EV1".to_string(),
            images: Vec::new(),
        });

        gallery.apply_realtime_event(&event).await.unwrap();
        gallery.apply_realtime_event(&event).await.unwrap();

        assert_eq!(gallery.partition(Partition::Public).len(), 2);
        assert_eq!(backend.count(Partition::Public), 2);
        assert_eq!(backend.count(Partition::Mine), 0);
    }

    #[tokio::test]
    async fn uploads_for_other_events_are_ignored() {
        let backend = Arc::new(CountingBackend::new(vec![record("p1")]));
        let gallery = view(backend.clone());

        let event = RealtimeEvent::Server(ServerEvent::PhotoUploaded {
            event_code: "OTHER".to_string(),
            images: Vec::new(),
        });
        gallery.apply_realtime_event(&event).await.unwrap();

        assert_eq!(backend.count(Partition::Public), 0);
    }

    #[tokio::test]
    async fn deletion_refreshes_source_and_mine() {
        let backend = Arc::new(CountingBackend::new(Vec::new()));
        let gallery = view(backend.clone());

        gallery
            .delete_photo(Partition::Public, "p1")
            .await
            .unwrap();

        assert_eq!(backend.count(Partition::Public), 1);
        assert_eq!(backend.count(Partition::Mine), 1);
        assert_eq!(backend.count(Partition::Private), 0);
    }

    #[tokio::test]
    async fn resync_refreshes_everything() {
        let backend = Arc::new(CountingBackend::new(Vec::new()));
        let gallery = view(backend.clone());

        gallery
            .apply_realtime_event(&RealtimeEvent::Resynced)
            .await
            .unwrap();

        for partition in Partition::ALL {
            assert_eq!(backend.count(partition), 1, "{partition:?}");
        }
    }

    #[tokio::test]
    async fn messages_track_new_and_deleted() {
        let backend = Arc::new(CountingBackend::new(Vec::new()));
        let gallery = view(backend.clone());

        let new = |m: &str| {
            RealtimeEvent::Server(ServerEvent::NewMessage {
                guest_id: "g1".to_string(),
                guest_name: "Ada".to_string(),
                message: m.to_string(),
            })
        };

        gallery.apply_realtime_event(&new("hello")).await.unwrap();
        gallery.apply_realtime_event(&new("again")).await.unwrap();
        gallery
            .apply_realtime_event(&RealtimeEvent::Server(ServerEvent::MessageDeleted {
                guest_id: "g1".to_string(),
                text: "hello".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(gallery.messages(), vec!["again".to_string()]);
    }

    #[tokio::test]
    async fn foreign_messages_are_ignored() {
        let backend = Arc::new(CountingBackend::new(Vec::new()));
        let gallery = view(backend.clone());

        gallery
            .apply_realtime_event(&RealtimeEvent::Server(ServerEvent::NewMessage {
                guest_id: "someone-else".to_string(),
                guest_name: "Bea".to_string(),
                message: "hi".to_string(),
            }))
            .await
            .unwrap();

        assert!(gallery.messages().is_empty());
    }
}
