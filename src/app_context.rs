use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::gallery::{ApiGalleryBackend, GuestGalleryView};
use crate::host::{ApiEventFetcher, HostDashboard};
use crate::realtime::{guest_room, host_room, RealtimeClient, RealtimeHandle};
use crate::session::{Session, SessionError, SessionStore};
use crate::upload::{SaveEndpoint, TransportRouter, UploadHandle, UploadService};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("session store unavailable: {0}")]
    Session(#[from] SessionError),
    #[error("origin request failed: {0}")]
    Api(#[from] ApiError),
}

/// Wired-up application services: one of these per process, cloned into
/// whatever drives the library.
#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub api: ApiClient,
    pub sessions: SessionStore,
    pub uploads: UploadHandle,
    pub realtime: RealtimeHandle,
}

impl AppContext {
    /// Wire everything from configuration and start the background services.
    pub async fn start(config: Config) -> Result<Self, ContextError> {
        let api = ApiClient::new(&config.server_base_url)?;
        let sessions = SessionStore::new(config.session_dir()).await?;
        let realtime = RealtimeClient::start(config.socket_url.clone());

        let uploads = UploadService::start(
            TransportRouter::from_api(&api),
            Arc::new(SaveEndpoint::new(api.clone())),
            sessions.clone(),
            Some(realtime.clone()),
            (&config).into(),
        );

        Ok(Self {
            config,
            api,
            sessions,
            uploads,
            realtime,
        })
    }

    /// Verify a guest against the server and cache the resulting session.
    ///
    /// The cached session, if present and fresh, pre-fills the guest name;
    /// the server response is authoritative for ids and quota either way.
    pub async fn verify_guest(
        &self,
        event_code: &str,
        guest_name: &str,
    ) -> Result<Session, ContextError> {
        let response = self.api.verify_guest(event_code, guest_name).await?;

        let session = Session::new(
            event_code.to_string(),
            response.guest_id,
            guest_name.to_string(),
            response.event_name.unwrap_or_default(),
            response.used_storage,
            response.storage_limit,
        );
        self.sessions.save(&session).await?;

        Ok(session)
    }

    /// Cached session for an event, if one exists and has not expired.
    pub async fn cached_session(&self, event_code: &str) -> Result<Option<Session>, ContextError> {
        Ok(self.sessions.load(event_code).await?)
    }

    /// Gallery view for a verified guest, joined to their realtime room.
    pub fn guest_gallery(&self, session: &Session) -> GuestGalleryView {
        self.realtime
            .join(&guest_room(&session.event_code, &session.guest_id));
        GuestGalleryView::new(
            session.event_code.clone(),
            session.guest_id.clone(),
            Arc::new(ApiGalleryBackend::new(self.api.clone())),
        )
    }

    /// Dashboard for a host, joined to the host room.
    pub fn host_dashboard(&self, event_code: &str, host_code: &str) -> HostDashboard {
        self.realtime.join(&host_room(event_code));
        HostDashboard::new(
            event_code.to_string(),
            host_code.to_string(),
            Arc::new(ApiEventFetcher::new(self.api.clone())),
        )
    }
}
