// Guest gallery reconcile loop driven through real channels: partial
// refreshes per event kind, idempotent replays, and the full resync after a
// reconnect.

use keepsake::api::ApiError;
use keepsake::gallery::{GalleryBackend, GuestGalleryView, Partition};
use keepsake::models::{MediaKind, MediaRecord, Visibility};
use keepsake::realtime::{RealtimeEvent, ServerEvent};
use keepsake::upload::UploadEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

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

    fn total(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
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

struct Loop {
    backend: Arc<CountingBackend>,
    view: GuestGalleryView,
    realtime_tx: broadcast::Sender<RealtimeEvent>,
    uploads_tx: mpsc::UnboundedSender<UploadEvent>,
}

fn spawn_loop(records: Vec<MediaRecord>) -> Loop {
    let backend = Arc::new(CountingBackend::new(records));
    let view = GuestGalleryView::new("EV1".to_string(), "g1".to_string(), backend.clone());

    let (realtime_tx, realtime_rx) = broadcast::channel(16);
    let (uploads_tx, uploads_rx) = mpsc::unbounded_channel();

    tokio::spawn(view.clone().run(realtime_rx, uploads_rx));

    Loop {
        backend,
        view,
        realtime_tx,
        uploads_tx,
    }
}

/// Poll until the backend has served `expected` fetches in total.
async fn wait_for_fetches(backend: &CountingBackend, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while backend.total() < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {expected} fetches, saw {} in time",
            backend.total()
        )
    });
}

fn remote_upload(event_code: &str) -> RealtimeEvent {
    RealtimeEvent::Server(ServerEvent::PhotoUploaded {
        event_code: event_code.to_string(),
        images: Vec::new(),
    })
}

#[tokio::test]
async fn local_private_upload_touches_private_and_mine_only() {
    let pipeline = spawn_loop(vec![record("p1")]);

    pipeline
        .uploads_tx
        .send(UploadEvent::Completed {
            batch_id: "b1".to_string(),
            visibility: Visibility::Private,
            media: vec![record("p1")],
            uploaded_bytes: 64,
        })
        .unwrap();

    wait_for_fetches(&pipeline.backend, 2).await;
    assert_eq!(pipeline.backend.count(Partition::Private), 1);
    assert_eq!(pipeline.backend.count(Partition::Mine), 1);
    assert_eq!(pipeline.backend.count(Partition::Public), 0);
}

#[tokio::test]
async fn remote_upload_touches_public_only_and_replay_is_idempotent() {
    let pipeline = spawn_loop(vec![record("p1"), record("p2")]);

    pipeline.realtime_tx.send(remote_upload("EV1")).unwrap();
    pipeline.realtime_tx.send(remote_upload("EV1")).unwrap();

    wait_for_fetches(&pipeline.backend, 2).await;
    assert_eq!(pipeline.backend.count(Partition::Public), 2);
    assert_eq!(pipeline.backend.count(Partition::Mine), 0);
    assert_eq!(pipeline.backend.count(Partition::Private), 0);

    // Replaying the same push twice must not duplicate entries
    assert_eq!(pipeline.view.partition(Partition::Public).len(), 2);
}

#[tokio::test]
async fn pushes_for_other_events_are_ignored() {
    let pipeline = spawn_loop(vec![record("p1")]);

    pipeline.realtime_tx.send(remote_upload("OTHER")).unwrap();
    pipeline.realtime_tx.send(remote_upload("EV1")).unwrap();

    wait_for_fetches(&pipeline.backend, 1).await;
    assert_eq!(pipeline.backend.count(Partition::Public), 1);
}

#[tokio::test]
async fn resync_after_reconnect_refreshes_all_partitions() {
    let pipeline = spawn_loop(Vec::new());

    pipeline.realtime_tx.send(RealtimeEvent::Resynced).unwrap();

    wait_for_fetches(&pipeline.backend, 3).await;
    for partition in Partition::ALL {
        assert_eq!(pipeline.backend.count(partition), 1, "{partition:?}");
    }
}

#[tokio::test]
async fn progress_and_failure_events_cause_no_fetches() {
    let pipeline = spawn_loop(Vec::new());

    pipeline
        .uploads_tx
        .send(UploadEvent::Progress {
            batch_id: "b1".to_string(),
            percent: 40,
        })
        .unwrap();
    pipeline
        .uploads_tx
        .send(UploadEvent::Failed {
            batch_id: "b1".to_string(),
            error: "nope".to_string(),
            saved: Vec::new(),
        })
        .unwrap();
    pipeline.realtime_tx.send(RealtimeEvent::Resynced).unwrap();

    wait_for_fetches(&pipeline.backend, 3).await;
    assert_eq!(pipeline.backend.total(), 3);
}
