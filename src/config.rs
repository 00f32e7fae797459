use std::path::PathBuf;

/// Default ceiling for the direct-to-storage path. Videos above this size are
/// routed through the origin instead (2.5 MiB, matching the signed-URL payload
/// limit the backend enforces).
pub const DEFAULT_DIRECT_UPLOAD_CEILING: u64 = 5 * 1024 * 1024 / 2;

/// Default per-batch file count ceiling.
pub const DEFAULT_MAX_FILES_PER_BATCH: usize = 10;

/// Application configuration
/// In debug builds: loads from .env file first, then the environment
#[derive(Clone, Debug)]
pub struct Config {
    /// Origin service base URL, e.g. `https://api.example.com/api`
    pub server_base_url: String,
    /// Realtime channel endpoint, e.g. `wss://api.example.com/socket`
    pub socket_url: String,
    /// Size above which videos take the routed path
    pub direct_upload_ceiling: u64,
    /// Maximum files accepted in one batch
    pub max_files_per_batch: usize,
    /// Directory for the local session cache; defaults to ~/.keepsake/sessions
    pub session_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the environment
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                tracing::info!("Config: dev mode, loaded .env file");
            }
        }

        Self::from_env()
    }

    fn from_env() -> Self {
        let server_base_url = std::env::var("KEEPSAKE_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:5000/api".to_string());

        let socket_url = std::env::var("KEEPSAKE_SOCKET_URL")
            .unwrap_or_else(|_| "ws://localhost:5000/socket".to_string());

        let direct_upload_ceiling = std::env::var("KEEPSAKE_DIRECT_UPLOAD_CEILING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DIRECT_UPLOAD_CEILING);

        let max_files_per_batch = std::env::var("KEEPSAKE_MAX_FILES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_FILES_PER_BATCH);

        let session_dir = std::env::var("KEEPSAKE_SESSION_DIR").ok().map(PathBuf::from);

        Self {
            server_base_url,
            socket_url,
            direct_upload_ceiling,
            max_files_per_batch,
            session_dir,
        }
    }

    /// Resolved session cache directory.
    pub fn session_dir(&self) -> PathBuf {
        self.session_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".keepsake")
                .join("sessions")
        })
    }
}
