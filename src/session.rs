use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;

/// Errors that can occur reading or writing the session cache
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Verified guest session, cached locally so a returning guest skips the
/// name form. Never authoritative: verification always re-queries the server
/// and the server response overwrites whatever is cached here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub event_code: String,
    pub guest_id: String,
    pub guest_name: String,
    pub event_name: String,
    pub used_storage: u64,
    pub storage_limit: u64,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Session lifetime granted on verification.
    pub const TTL_HOURS: i64 = 1;

    pub fn new(
        event_code: String,
        guest_id: String,
        guest_name: String,
        event_name: String,
        used_storage: u64,
        storage_limit: u64,
    ) -> Self {
        Self {
            event_code,
            guest_id,
            guest_name,
            event_name,
            used_storage,
            storage_limit,
            expires_at: Utc::now() + Duration::hours(Self::TTL_HOURS),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Bytes still available under the event quota.
    pub fn remaining_storage(&self) -> u64 {
        self.storage_limit.saturating_sub(self.used_storage)
    }

    pub fn quota_exhausted(&self) -> bool {
        self.used_storage >= self.storage_limit
    }

    /// Optimistic local bump after a confirmed batch. The next server
    /// response always wins over this arithmetic.
    pub fn record_uploaded_bytes(&mut self, bytes: u64) {
        self.used_storage = self.used_storage.saturating_add(bytes);
    }
}

/// Disk-backed session cache, one JSON file per event code.
///
/// Expiry is lazy: a read past `expires_at` deletes the file and yields
/// nothing. No background timers are involved, so nothing can leak across
/// view lifecycles.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub async fn new(dir: PathBuf) -> Result<Self, SessionError> {
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn session_path(&self, event_code: &str) -> PathBuf {
        // Event codes are short alphanumerics; anything else is sanitized so
        // the code can't escape the cache directory.
        let safe: String = event_code
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// Load the cached session for an event, if present and not expired.
    pub async fn load(&self, event_code: &str) -> Result<Option<Session>, SessionError> {
        let path = self.session_path(event_code);

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session: Session = match serde_json::from_slice(&raw) {
            Ok(s) => s,
            Err(e) => {
                // Corrupt cache entry: drop it and treat as a miss
                tracing::warn!("SessionStore: unreadable session for {event_code}: {e}");
                let _ = fs::remove_file(&path).await;
                return Ok(None);
            }
        };

        if session.is_expired() {
            tracing::debug!("SessionStore: session for {event_code} expired, clearing");
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(session))
    }

    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let path = self.session_path(&session.event_code);
        let raw = serde_json::to_vec_pretty(session)?;
        fs::write(&path, raw).await?;
        Ok(())
    }

    pub async fn clear(&self, event_code: &str) -> Result<(), SessionError> {
        let path = self.session_path(event_code);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_session(event_code: &str) -> Session {
        Session::new(
            event_code.to_string(),
            "guest-1".to_string(),
            "Ada".to_string(),
            "Wedding".to_string(),
            0,
            1_000_000,
        )
    }

    #[tokio::test]
    async fn round_trips_a_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf()).await.unwrap();

        store.save(&test_session("EV123")).await.unwrap();
        let loaded = store.load("EV123").await.unwrap().unwrap();
        assert_eq!(loaded.guest_id, "guest-1");
        assert_eq!(loaded.event_name, "Wedding");
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf()).await.unwrap();
        assert!(store.load("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_cleared_on_read() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf()).await.unwrap();

        let mut session = test_session("EV123");
        session.expires_at = Utc::now() - Duration::minutes(1);
        store.save(&session).await.unwrap();

        assert!(store.load("EV123").await.unwrap().is_none());
        // The file is gone, not just filtered
        assert!(!dir.path().join("EV123.json").exists());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().to_path_buf()).await.unwrap();
        store.clear("EV123").await.unwrap();
        store.save(&test_session("EV123")).await.unwrap();
        store.clear("EV123").await.unwrap();
        store.clear("EV123").await.unwrap();
    }

    #[test]
    fn quota_accounting() {
        let mut session = test_session("EV123");
        assert_eq!(session.remaining_storage(), 1_000_000);
        assert!(!session.quota_exhausted());

        session.record_uploaded_bytes(1_000_000);
        assert!(session.quota_exhausted());
        assert_eq!(session.remaining_storage(), 0);

        // Saturates rather than wrapping
        session.record_uploaded_bytes(u64::MAX);
        assert_eq!(session.used_storage, u64::MAX);
    }
}
