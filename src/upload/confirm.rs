use crate::api::{ApiClient, ApiError, SaveFileEntry};
use crate::models::{normalize_photos, MediaRecord, ObjectRef};
use crate::upload::transport::TransferContext;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfirmError {
    #[error("save endpoint rejected the batch: {0}")]
    Save(#[from] ApiError),
}

/// Registers a batch's stored objects as media records.
///
/// One consolidated round trip per batch. If it fails, the objects exist in
/// storage with no record pointing at them; reconciling those orphans is the
/// origin's problem, and the batch is reported failed here.
#[async_trait::async_trait]
pub trait BatchConfirmer: Send + Sync {
    async fn confirm(
        &self,
        ctx: &TransferContext,
        objects: &[ObjectRef],
    ) -> Result<Vec<MediaRecord>, ConfirmError>;
}

/// Production confirmer backed by the origin's save endpoint.
pub struct SaveEndpoint {
    api: ApiClient,
}

impl SaveEndpoint {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl BatchConfirmer for SaveEndpoint {
    async fn confirm(
        &self,
        ctx: &TransferContext,
        objects: &[ObjectRef],
    ) -> Result<Vec<MediaRecord>, ConfirmError> {
        let files: Vec<SaveFileEntry> = objects
            .iter()
            .map(|o| SaveFileEntry {
                image_url: o.public_url.clone(),
                s3_key: o.s3_key.clone(),
                file_size: o.file_size,
            })
            .collect();

        let response = self
            .api
            .save_batch(&ctx.event_code, &ctx.guest_id, &files, ctx.visibility)
            .await?;

        Ok(normalize_photos(
            &response.photos,
            Some(ctx.visibility),
            Some(&ctx.guest_id),
        ))
    }
}

pub mod mock {
    //! Scriptable confirmer for pipeline tests.

    use super::*;
    use crate::models::MediaKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct MockConfirmer {
        pub confirm_calls: AtomicUsize,
        fail: bool,
    }

    impl MockConfirmer {
        pub fn new() -> Self {
            Self {
                confirm_calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                confirm_calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    impl Default for MockConfirmer {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait::async_trait]
    impl BatchConfirmer for MockConfirmer {
        async fn confirm(
            &self,
            ctx: &TransferContext,
            objects: &[ObjectRef],
        ) -> Result<Vec<MediaRecord>, ConfirmError> {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                return Err(ConfirmError::Save(ApiError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    message: "save failed".to_string(),
                }));
            }

            Ok(objects
                .iter()
                .enumerate()
                .map(|(i, o)| MediaRecord {
                    id: format!("media-{i}"),
                    url: o.public_url.clone(),
                    kind: MediaKind::Image,
                    owner_guest_id: Some(ctx.guest_id.clone()),
                    visibility: Some(ctx.visibility),
                })
                .collect())
        }
    }
}
