use serde::{Deserialize, Serialize};

/// Who can see an uploaded item: the whole event or only the uploading guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn is_private(&self) -> bool {
        matches!(self, Visibility::Private)
    }
}

/// Media category, derived from the file's MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a MIME type. Anything that is not `image/*` is treated as video,
    /// matching the upload form's `image/*,video/*` accept filter.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            MediaKind::Image
        } else {
            MediaKind::Video
        }
    }
}

/// A persisted media item as the server reports it back.
///
/// The client never fabricates record IDs; these only come from save
/// confirmations, partition fetches, or realtime events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub url: String,
    pub kind: MediaKind,
    pub owner_guest_id: Option<String>,
    /// `None` when the source endpoint does not report visibility (the
    /// combined "mine" listing mixes both); consumers fall back to the
    /// partition the record was fetched into.
    pub visibility: Option<Visibility>,
}

/// Reference to raw bytes that landed in object storage, before the save
/// endpoint has turned them into a MediaRecord.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRef {
    pub public_url: String,
    pub s3_key: String,
    pub file_size: u64,
}

/// Photo entry as it appears in API responses. The backend is inconsistent
/// about field names (`_id` vs `photoId`, `imageUrl` vs `videoUrl`), so every
/// variant is optional here and normalized in one place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WirePhoto {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "photoId", skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<String>,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "videoUrl", skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl WirePhoto {
    /// Collapse the wire shape into a MediaRecord. Entries with no usable id
    /// or URL are dropped by callers. `visibility` is `None` when the source
    /// endpoint does not distinguish it.
    pub fn normalize(
        &self,
        visibility: Option<Visibility>,
        owner: Option<&str>,
    ) -> Option<MediaRecord> {
        let id = self.id.clone().or_else(|| self.photo_id.clone())?;
        let (url, kind) = match (&self.image_url, &self.video_url) {
            (Some(u), _) => (u.clone(), MediaKind::Image),
            (None, Some(u)) => (u.clone(), MediaKind::Video),
            (None, None) => return None,
        };
        Some(MediaRecord {
            id,
            url,
            kind,
            owner_guest_id: owner.map(str::to_string),
            visibility,
        })
    }
}

/// Normalize a list of wire photos, dropping malformed entries.
pub fn normalize_photos(
    photos: &[WirePhoto],
    visibility: Option<Visibility>,
    owner: Option<&str>,
) -> Vec<MediaRecord> {
    photos
        .iter()
        .filter_map(|p| p.normalize(visibility, owner))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_from_content_type() {
        assert_eq!(MediaKind::from_content_type("image/jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::from_content_type("image/webp"), MediaKind::Image);
        assert_eq!(MediaKind::from_content_type("video/mp4"), MediaKind::Video);
    }

    #[test]
    fn normalize_prefers_mongo_id_over_photo_id() {
        let photo = WirePhoto {
            id: Some("abc".into()),
            photo_id: Some("def".into()),
            image_url: Some("https://cdn.example/x.webp".into()),
            video_url: None,
        };
        let record = photo
            .normalize(Some(Visibility::Public), Some("guest-1"))
            .unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.kind, MediaKind::Image);
        assert_eq!(record.owner_guest_id.as_deref(), Some("guest-1"));
    }

    #[test]
    fn normalize_falls_back_to_video_url() {
        let photo = WirePhoto {
            photo_id: Some("v1".into()),
            video_url: Some("https://cdn.example/clip.mp4".into()),
            ..Default::default()
        };
        let record = photo.normalize(Some(Visibility::Private), None).unwrap();
        assert_eq!(record.kind, MediaKind::Video);
        assert_eq!(record.visibility, Some(Visibility::Private));
    }

    #[test]
    fn normalize_drops_entries_without_id_or_url() {
        assert!(WirePhoto::default().normalize(None, None).is_none());

        let no_url = WirePhoto {
            id: Some("x".into()),
            ..Default::default()
        };
        assert!(no_url.normalize(Some(Visibility::Public), None).is_none());
    }

    #[test]
    fn normalize_without_visibility_leaves_it_unset() {
        let photo = WirePhoto {
            id: Some("m1".into()),
            image_url: Some("https://cdn.example/m1.webp".into()),
            ..Default::default()
        };
        let record = photo.normalize(None, Some("guest-1")).unwrap();
        assert_eq!(record.visibility, None);
    }
}
