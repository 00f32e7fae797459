use crate::models::{MediaKind, MediaRecord, Visibility};
use bytes::Bytes;

/// An in-memory file selected for upload, after the picker but before any
/// normalization.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_content_type(&self.content_type)
    }

    pub fn is_image(&self) -> bool {
        self.kind() == MediaKind::Image
    }

    pub fn is_video(&self) -> bool {
        self.kind() == MediaKind::Video
    }
}

/// One user action's worth of files, submitted together.
#[derive(Debug)]
pub struct BatchRequest {
    pub event_code: String,
    pub guest_id: String,
    pub visibility: Visibility,
    pub files: Vec<UploadFile>,
}

impl BatchRequest {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(UploadFile::size).sum()
    }
}

/// Progress and outcome updates during batch upload
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Started {
        batch_id: String,
        total_files: usize,
    },
    /// Aggregate percentage over the whole batch; non-decreasing.
    Progress {
        batch_id: String,
        percent: u8,
    },
    /// A file was dropped from the batch before transfer (transcode failure).
    FileSkipped {
        batch_id: String,
        file_name: String,
        error: String,
    },
    Completed {
        batch_id: String,
        visibility: Visibility,
        media: Vec<MediaRecord>,
        uploaded_bytes: u64,
    },
    /// The batch did not finish. Files transferred before the failure are
    /// still persisted and listed in `saved`; the rest were abandoned.
    Failed {
        batch_id: String,
        error: String,
        saved: Vec<MediaRecord>,
    },
}

impl UploadEvent {
    pub fn batch_id(&self) -> &str {
        match self {
            UploadEvent::Started { batch_id, .. }
            | UploadEvent::Progress { batch_id, .. }
            | UploadEvent::FileSkipped { batch_id, .. }
            | UploadEvent::Completed { batch_id, .. }
            | UploadEvent::Failed { batch_id, .. } => batch_id,
        }
    }
}
