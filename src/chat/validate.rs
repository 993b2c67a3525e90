//! Local checks that run before anything reaches the network.

use super::ChatError;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Only images, and nothing larger than `max_bytes`.
pub fn validate_upload(mime_type: &str, size: u64, max_bytes: u64) -> Result<(), ChatError> {
    if !mime_type.starts_with("image/") {
        return Err(ChatError::UnsupportedFileType(mime_type.to_string()));
    }
    if size > max_bytes {
        return Err(ChatError::FileTooLarge { size, max: max_bytes });
    }
    Ok(())
}

/// A submission needs text or an unused attachment.
pub fn validate_submission(text: &str, has_attachment: bool) -> Result<(), ChatError> {
    if text.trim().is_empty() && !has_attachment {
        return Err(ChatError::EmptySubmission);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_images_within_limit() {
        assert!(validate_upload("image/jpeg", 1024, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert!(validate_upload("image/png", DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn rejects_non_images() {
        let err = validate_upload("application/pdf", 10, DEFAULT_MAX_UPLOAD_BYTES).unwrap_err();
        assert_eq!(err, ChatError::UnsupportedFileType("application/pdf".into()));
        assert_eq!(
            err.to_string(),
            "Please select a valid image file (JPEG, PNG, GIF, etc.)"
        );
    }

    #[test]
    fn rejects_oversized_uploads() {
        let err =
            validate_upload("image/png", DEFAULT_MAX_UPLOAD_BYTES + 1, DEFAULT_MAX_UPLOAD_BYTES)
                .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Image file is too large. Please select an image smaller than 10MB."
        );
    }

    #[test]
    fn whitespace_only_without_attachment_is_empty() {
        assert_eq!(validate_submission("  \n", false), Err(ChatError::EmptySubmission));
        assert!(validate_submission("", true).is_ok());
        assert!(validate_submission("hi", false).is_ok());
    }
}
