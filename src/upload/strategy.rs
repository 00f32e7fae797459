use crate::upload::UploadFile;

/// How a file's bytes get to object storage.
///
/// Direct: the client PUTs straight to storage using a short-lived signed URL.
/// Routed: the client posts to the origin, which performs the storage write
/// (used for large videos where signed-URL payloads are impractical and the
/// origin wants to validate the body server-side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Routed,
}

/// Pick the transfer path for a file. Pure function of (kind, size): only
/// videos above the ceiling take the routed path. Decided per file, so one
/// batch can mix strategies.
pub fn select_strategy(file: &UploadFile, direct_upload_ceiling: u64) -> Strategy {
    if file.is_video() && file.size() > direct_upload_ceiling {
        Strategy::Routed
    } else {
        Strategy::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DIRECT_UPLOAD_CEILING;
    use bytes::Bytes;

    fn file_of(content_type: &str, size: usize) -> UploadFile {
        UploadFile::new("f", content_type, Bytes::from(vec![0u8; size]))
    }

    #[test]
    fn images_always_go_direct() {
        let big_image = file_of("image/jpeg", DEFAULT_DIRECT_UPLOAD_CEILING as usize + 1);
        assert_eq!(
            select_strategy(&big_image, DEFAULT_DIRECT_UPLOAD_CEILING),
            Strategy::Direct
        );
    }

    #[test]
    fn small_videos_go_direct() {
        let clip = file_of("video/mp4", 1024);
        assert_eq!(
            select_strategy(&clip, DEFAULT_DIRECT_UPLOAD_CEILING),
            Strategy::Direct
        );
    }

    #[test]
    fn large_videos_are_routed() {
        let movie = file_of("video/mp4", DEFAULT_DIRECT_UPLOAD_CEILING as usize + 1);
        assert_eq!(
            select_strategy(&movie, DEFAULT_DIRECT_UPLOAD_CEILING),
            Strategy::Routed
        );
    }

    #[test]
    fn video_exactly_at_ceiling_goes_direct() {
        let clip = file_of("video/mp4", DEFAULT_DIRECT_UPLOAD_CEILING as usize);
        assert_eq!(
            select_strategy(&clip, DEFAULT_DIRECT_UPLOAD_CEILING),
            Strategy::Direct
        );
    }

    #[test]
    fn selection_is_idempotent() {
        let movie = file_of("video/quicktime", DEFAULT_DIRECT_UPLOAD_CEILING as usize * 2);
        let first = select_strategy(&movie, DEFAULT_DIRECT_UPLOAD_CEILING);
        let second = select_strategy(&movie, DEFAULT_DIRECT_UPLOAD_CEILING);
        assert_eq!(first, second);
    }
}
