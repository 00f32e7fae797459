// # Host Dashboard - Event Snapshot Reconciliation
//
// The host view is one paginated snapshot of the whole event (guests, their
// messages, photos, storage usage) rather than per-guest partitions. Photo
// pushes trigger a snapshot re-fetch; message pushes are applied in memory so
// chat stays live without a round trip per message.

use crate::api::{ApiClient, ApiError, HostEvent};
use crate::realtime::{RealtimeEvent, ServerEvent};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Fetch seam for the host snapshot.
#[async_trait::async_trait]
pub trait EventFetcher: Send + Sync {
    async fn fetch(
        &self,
        event_code: &str,
        host_code: &str,
        page: u32,
        per_page: u32,
    ) -> Result<HostEvent, ApiError>;
}

pub struct ApiEventFetcher {
    api: ApiClient,
}

impl ApiEventFetcher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl EventFetcher for ApiEventFetcher {
    async fn fetch(
        &self,
        event_code: &str,
        host_code: &str,
        page: u32,
        per_page: u32,
    ) -> Result<HostEvent, ApiError> {
        self.api
            .fetch_event_for_host(event_code, host_code, page, per_page)
            .await
    }
}

const DEFAULT_PHOTOS_PER_PAGE: u32 = 30;

/// Host dashboard state. Clones share state like the gallery view does.
#[derive(Clone)]
pub struct HostDashboard {
    event_code: String,
    host_code: String,
    fetcher: Arc<dyn EventFetcher>,
    state: Arc<Mutex<DashboardState>>,
}

struct DashboardState {
    event: HostEvent,
    page: u32,
    per_page: u32,
}

impl HostDashboard {
    pub fn new(event_code: String, host_code: String, fetcher: Arc<dyn EventFetcher>) -> Self {
        Self {
            event_code,
            host_code,
            fetcher,
            state: Arc::new(Mutex::new(DashboardState {
                event: HostEvent::default(),
                page: 1,
                per_page: DEFAULT_PHOTOS_PER_PAGE,
            })),
        }
    }

    pub fn snapshot(&self) -> HostEvent {
        self.state.lock().unwrap().event.clone()
    }

    pub fn page(&self) -> u32 {
        self.state.lock().unwrap().page
    }

    /// Re-fetch the snapshot for the current page.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let (page, per_page) = {
            let state = self.state.lock().unwrap();
            (state.page, state.per_page)
        };
        let event = self
            .fetcher
            .fetch(&self.event_code, &self.host_code, page, per_page)
            .await?;
        debug!(
            "Host: refreshed {} page {page} ({} photos, {} guests)",
            self.event_code,
            event.photos.len(),
            event.guests.len()
        );
        self.state.lock().unwrap().event = event;
        Ok(())
    }

    /// Switch the photo page and fetch it.
    pub async fn go_to_page(&self, page: u32) -> Result<(), ApiError> {
        self.state.lock().unwrap().page = page.max(1);
        self.refresh().await
    }

    /// Reconcile one fan-out event.
    pub async fn apply_realtime_event(&self, event: &RealtimeEvent) -> Result<(), ApiError> {
        match event {
            RealtimeEvent::Server(ServerEvent::PhotoUploaded { event_code, .. }) => {
                if event_code == &self.event_code {
                    self.refresh().await?;
                }
            }
            RealtimeEvent::Server(ServerEvent::NewMessage {
                guest_id,
                guest_name,
                message,
            }) => {
                let mut state = self.state.lock().unwrap();
                match state.event.guests.iter_mut().find(|g| &g.id == guest_id) {
                    Some(guest) => guest.messages.push(message.clone()),
                    None => {
                        // First sign of a new guest; a full refresh would also
                        // pick up their photos, but the message alone is
                        // enough to show
                        state.event.guests.push(crate::api::HostGuest {
                            id: guest_id.clone(),
                            guest_name: Some(guest_name.clone()),
                            messages: vec![message.clone()],
                        });
                    }
                }
            }
            RealtimeEvent::Server(ServerEvent::MessageDeleted { guest_id, text }) => {
                let mut state = self.state.lock().unwrap();
                if let Some(guest) = state.event.guests.iter_mut().find(|g| &g.id == guest_id) {
                    if let Some(pos) = guest.messages.iter().position(|m| m == text) {
                        guest.messages.remove(pos);
                    }
                }
            }
            RealtimeEvent::Resynced => {
                self.refresh().await?;
            }
            RealtimeEvent::ConnectionLost => {}
        }
        Ok(())
    }

    /// Drive reconciliation until the realtime channel closes.
    pub async fn run(self, mut realtime_rx: broadcast::Receiver<RealtimeEvent>) {
        loop {
            match realtime_rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.apply_realtime_event(&event).await {
                        warn!("Host: refresh after realtime event failed: {e}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Host: dropped {n} realtime events, refreshing snapshot");
                    if let Err(e) = self.refresh().await {
                        warn!("Host: snapshot refresh failed: {e}");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("Host: reconcile loop for {} finished", self.event_code);
    }
}
