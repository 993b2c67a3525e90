//! `data:` URL codec for images moving between coordinator, replica and overlay.

use base64::{engine::general_purpose::STANDARD, Engine};

pub fn png_data_url(png_bytes: &[u8]) -> String {
    data_url("image/png", png_bytes)
}

pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Decoded payload of a base64 `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub fn decode_data_url(url: &str) -> Result<DataUrl, DataUrlError> {
    let rest = url.strip_prefix("data:").ok_or(DataUrlError::NotADataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::MissingPayload)?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or(DataUrlError::NotBase64)?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| DataUrlError::InvalidBase64(e.to_string()))?;

    if bytes.is_empty() {
        return Err(DataUrlError::MissingPayload);
    }

    Ok(DataUrl {
        mime_type: if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type.to_string()
        },
        bytes,
    })
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("Not a data URL")]
    NotADataUrl,

    #[error("Data URL has no payload")]
    MissingPayload,

    #[error("Data URL is not base64-encoded")]
    NotBase64,

    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_url() {
        let url = png_data_url(&[1, 2, 3]);
        assert!(url.starts_with("data:image/png;base64,"));
        let decoded = decode_data_url(&url).unwrap();
        assert_eq!(decoded.mime_type, "image/png");
        assert_eq!(decoded.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_plain_urls() {
        assert_eq!(
            decode_data_url("https://example.com/a.png"),
            Err(DataUrlError::NotADataUrl)
        );
    }

    #[test]
    fn rejects_percent_encoded_payloads() {
        assert_eq!(
            decode_data_url("data:text/plain,hello"),
            Err(DataUrlError::NotBase64)
        );
    }

    #[test]
    fn empty_payload_is_no_data() {
        assert_eq!(
            decode_data_url("data:image/png;base64,"),
            Err(DataUrlError::MissingPayload)
        );
    }
}
