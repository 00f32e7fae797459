use crate::models::{normalize_photos, MediaRecord, Visibility, WirePhoto};
use reqwest::{Client, Error as ReqwestError, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use urlencoding::encode;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),
    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },
}

impl ApiError {
    /// Status code of the failure, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Request(e) => e.status(),
            ApiError::Status { status, .. } => Some(*status),
        }
    }
}

/// Guest verification response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub guest_id: String,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub used_storage: u64,
    #[serde(default)]
    pub storage_limit: u64,
    #[serde(default)]
    pub photos: Vec<WirePhoto>,
}

/// Short-lived write credential for the direct path. `url` accepts exactly one
/// PUT of the named object; `public_url`/`key` identify the result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub url: String,
    pub public_url: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignRequest<'a> {
    file_name: &'a str,
    file_type: &'a str,
    event_code: &'a str,
    guest_id: &'a str,
}

/// One object entry in the consolidated save request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFileEntry {
    pub image_url: String,
    pub s3_key: String,
    pub file_size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest<'a> {
    event_code: &'a str,
    guest_id: &'a str,
    files: &'a [SaveFileEntry],
    is_private: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub photos: Vec<WirePhoto>,
}

/// Routed-path upload response; the origin did the storage write itself.
#[derive(Debug, Deserialize)]
pub struct RoutedUploadResponse {
    #[serde(default)]
    pub photos: Vec<RoutedPhoto>,
}

#[derive(Debug, Deserialize)]
pub struct RoutedPhoto {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct GalleryResponse {
    #[serde(default)]
    photos: Vec<WirePhoto>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<String>,
}

/// Host dashboard snapshot: guests with their messages plus photo pagination.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEvent {
    #[serde(default)]
    pub guests: Vec<HostGuest>,
    #[serde(default)]
    pub photos: Vec<WirePhoto>,
    #[serde(default)]
    pub used_storage: u64,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostGuest {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_pages: u32,
    pub total_photos: u64,
}

#[derive(Debug, Deserialize)]
struct HostEventResponse {
    event: HostEvent,
}

/// HTTP client for the origin service.
///
/// Thin typed wrapper over reqwest; every method is one endpoint. Transfer
/// paths that need streaming bodies borrow the raw client via `client()`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Raw client for custom requests (signed-URL PUT, multipart streaming).
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn check<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, message });
        }
        Ok(response.json().await?)
    }

    async fn check_empty(response: reqwest::Response) -> Result<(), ApiError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, message });
        }
        Ok(())
    }

    /// Verify a guest name against an event. Always hits the server; the
    /// cached session is only a convenience on top of this.
    pub async fn verify_guest(
        &self,
        event_code: &str,
        guest_name: &str,
    ) -> Result<VerifyResponse, ApiError> {
        let url = self.build_url(&format!("/guest/{}/verify", encode(event_code)));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "guestName": guest_name }))
            .send()
            .await?;
        Self::check(response).await
    }

    /// Request a single-use write credential for the direct path, scoped to
    /// this event, guest, file name and content type.
    pub async fn presigned_url(
        &self,
        event_code: &str,
        guest_id: &str,
        file_name: &str,
        file_type: &str,
    ) -> Result<PresignResponse, ApiError> {
        let url = self.build_url("/s3/presigned-url");
        let response = self
            .client
            .post(&url)
            .json(&PresignRequest {
                file_name,
                file_type,
                event_code,
                guest_id,
            })
            .send()
            .await?;
        Self::check(response).await
    }

    /// Register a whole batch of stored objects as media records in one round
    /// trip. Quota enforcement happens server-side here.
    pub async fn save_batch(
        &self,
        event_code: &str,
        guest_id: &str,
        files: &[SaveFileEntry],
        visibility: Visibility,
    ) -> Result<SaveResponse, ApiError> {
        let url = self.build_url("/photos/save");
        let response = self
            .client
            .post(&url)
            .json(&SaveRequest {
                event_code,
                guest_id,
                files,
                is_private: visibility.is_private(),
            })
            .send()
            .await?;
        Self::check(response).await
    }

    /// Public gallery partition: everyone's public uploads for the event.
    pub async fn public_gallery(&self, event_code: &str) -> Result<Vec<MediaRecord>, ApiError> {
        let url = self.build_url(&format!("/photos/{}/public-gallery", encode(event_code)));
        let response = self.client.get(&url).send().await?;
        let body: GalleryResponse = Self::check(response).await?;
        Ok(normalize_photos(&body.photos, Some(Visibility::Public), None))
    }

    /// Private partition: this guest's private uploads.
    pub async fn private_photos(
        &self,
        event_code: &str,
        guest_id: &str,
    ) -> Result<Vec<MediaRecord>, ApiError> {
        let url = self.build_url(&format!(
            "/photos/{}/{}/private-photos",
            encode(event_code),
            encode(guest_id)
        ));
        let response = self.client.get(&url).send().await?;
        let body: GalleryResponse = Self::check(response).await?;
        Ok(normalize_photos(
            &body.photos,
            Some(Visibility::Private),
            Some(guest_id),
        ))
    }

    /// "Mine" partition: everything this guest uploaded, public or private.
    /// The wire shape carries no per-photo visibility, so these records come
    /// back with `visibility: None`.
    pub async fn guest_photos(
        &self,
        event_code: &str,
        guest_id: &str,
    ) -> Result<Vec<MediaRecord>, ApiError> {
        let url = self.build_url(&format!(
            "/guest/{}/{}/photos",
            encode(event_code),
            encode(guest_id)
        ));
        let response = self.client.get(&url).send().await?;
        let body: GalleryResponse = Self::check(response).await?;
        Ok(normalize_photos(&body.photos, None, Some(guest_id)))
    }

    pub async fn delete_photo(
        &self,
        event_code: &str,
        guest_id: &str,
        photo_id: &str,
    ) -> Result<(), ApiError> {
        let url = self.build_url(&format!(
            "/photos/delete-photo/{}/{}/{}",
            encode(event_code),
            encode(guest_id),
            encode(photo_id)
        ));
        let response = self.client.delete(&url).send().await?;
        Self::check_empty(response).await
    }

    pub async fn submit_guest_message(
        &self,
        event_code: &str,
        guest_id: &str,
        message: &str,
    ) -> Result<(), ApiError> {
        let url = self.build_url(&format!(
            "/guest/{}/{}/message",
            encode(event_code),
            encode(guest_id)
        ));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        Self::check_empty(response).await
    }

    pub async fn fetch_guest_messages(
        &self,
        event_code: &str,
        guest_id: &str,
    ) -> Result<Vec<String>, ApiError> {
        let url = self.build_url(&format!(
            "/guest/{}/{}/messages",
            encode(event_code),
            encode(guest_id)
        ));
        let response = self.client.get(&url).send().await?;
        let body: MessagesResponse = Self::check(response).await?;
        Ok(body.messages)
    }

    /// Delete one of the guest's messages, identified by its text.
    pub async fn delete_guest_message(
        &self,
        event_code: &str,
        guest_id: &str,
        text: &str,
    ) -> Result<(), ApiError> {
        let url = self.build_url(&format!(
            "/guest/{}/{}/messages",
            encode(event_code),
            encode(guest_id)
        ));
        let response = self
            .client
            .delete(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        Self::check_empty(response).await
    }

    /// Host dashboard snapshot with paginated photos.
    pub async fn fetch_event_for_host(
        &self,
        event_code: &str,
        host_code: &str,
        page: u32,
        per_page: u32,
    ) -> Result<HostEvent, ApiError> {
        let url = self.build_url(&format!(
            "/event/{}/{}",
            encode(event_code),
            encode(host_code)
        ));
        let response = self
            .client
            .get(&url)
            .query(&[("page", page.to_string()), ("limit", per_page.to_string())])
            .send()
            .await?;
        let body: HostEventResponse = Self::check(response).await?;
        Ok(body.event)
    }
}
