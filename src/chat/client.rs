//! HTTP client for the chat backend.
//!
//! `POST /chat` takes a multipart form (`thread_id`, optional `message`,
//! optional `image`) and answers `{reply}` or `{error}`.
//! `GET /chat?thread_id=<id>` answers `{messages: [...]}`.

use super::thread::ChatMessage;
use super::ChatError;
use crate::capture::{data_url, decode_data_url};
use crate::config::AppConfig;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Reply text used when the backend answers 2xx without a string `reply`.
pub const NO_VALID_RESPONSE: &str = "No valid response.";

/// An image waiting to be sent with the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn from_data_url(url: &str, file_name: impl Into<String>) -> Result<Self, ChatError> {
        let decoded = decode_data_url(url).map_err(|e| ChatError::InvalidAttachment(e.to_string()))?;
        Ok(Self::new(file_name, decoded.mime_type, decoded.bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn to_data_url(&self) -> String {
        data_url(&self.mime_type, &self.bytes)
    }

    /// Hex SHA-256 of the image bytes.
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}

#[derive(Deserialize)]
struct ReplyBody {
    #[serde(default)]
    reply: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct HistoryBody {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChatError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url)
    }

    /// Send one message to a thread and return the assistant's reply.
    pub async fn send(
        &self,
        thread_id: &str,
        message: Option<&str>,
        image: Option<&Attachment>,
    ) -> Result<String, ChatError> {
        let message = message.map(str::trim).filter(|m| !m.is_empty());
        if message.is_none() && image.is_none() {
            return Err(ChatError::EmptySubmission);
        }

        let mut form = Form::new().text("thread_id", thread_id.to_string());
        if let Some(text) = message {
            form = form.text("message", text.to_string());
        }
        if let Some(image) = image {
            let part = Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.mime_type)
                .map_err(|e| ChatError::InvalidAttachment(e.to_string()))?;
            form = form.part("image", part);
        }

        log::info!(
            "[CHAT] Sending to thread {} (text: {}, image: {})",
            thread_id,
            message.is_some(),
            image.map(|i| i.bytes.len()).unwrap_or(0)
        );
        let start = std::time::Instant::now();

        let response = self
            .http
            .post(self.chat_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                log::error!("[CHAT] HTTP request failed: {}", e);
                ChatError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = failure_reason(response).await;
            log::error!("[CHAT] Backend returned {}: {}", status, reason);
            return Err(ChatError::Backend(reason));
        }

        let body: ReplyBody = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        log::info!("[CHAT] Reply in {}ms", start.elapsed().as_millis());

        Ok(match body.reply {
            Some(serde_json::Value::String(reply)) => reply,
            _ => NO_VALID_RESPONSE.to_string(),
        })
    }

    /// Fetch a thread's stored history.
    pub async fn history(&self, thread_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let response = self
            .http
            .get(self.chat_url())
            .query(&[("thread_id", thread_id)])
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Backend(failure_reason(response).await));
        }

        let body: HistoryBody = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        log::debug!("[CHAT] Loaded {} messages for thread {}", body.messages.len(), thread_id);
        Ok(body.messages)
    }
}

const NETWORK_ERROR: &str = "Network error";

/// A JSON body yields its `error` field, or "Network error" without one.
/// A body that is not JSON yields the HTTP status text instead.
async fn failure_reason(response: reqwest::Response) -> String {
    let status_text = response.status().canonical_reason();
    let body = response.bytes().await.unwrap_or_default();
    reason_from_body(&body, status_text)
}

fn reason_from_body(body: &[u8], status_text: Option<&str>) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => match value.get("error") {
            Some(serde_json::Value::String(error)) if !error.is_empty() => error.clone(),
            _ => NETWORK_ERROR.to_string(),
        },
        Err(_) => status_text.unwrap_or(NETWORK_ERROR).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_without_error_field_is_a_network_error() {
        assert_eq!(reason_from_body(br#"{"detail":"nope"}"#, Some("Bad Gateway")), "Network error");
        assert_eq!(reason_from_body(br#"{"error":""}"#, Some("Bad Gateway")), "Network error");
    }

    #[test]
    fn error_field_wins() {
        assert_eq!(reason_from_body(br#"{"error":"quota"}"#, Some("Bad Request")), "quota");
    }

    #[test]
    fn unparseable_body_falls_back_to_status_text() {
        assert_eq!(reason_from_body(b"<html>", Some("Bad Gateway")), "Bad Gateway");
        assert_eq!(reason_from_body(b"", None), "Network error");
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        let client = ChatClient::new("http://localhost:5000/");
        assert_eq!(client.chat_url(), "http://localhost:5000/chat");
    }

    #[test]
    fn attachment_round_trips_through_data_url() {
        let att = Attachment::new("a.png", "image/png", vec![1, 2, 3]);
        let back = Attachment::from_data_url(&att.to_data_url(), "a.png").unwrap();
        assert_eq!(back, att);
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let att = Attachment::new("a.png", "image/png", b"abc".to_vec());
        assert_eq!(
            att.fingerprint(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn empty_send_is_rejected_before_network() {
        // Nothing listens on this port; reaching the network would fail differently.
        let client = ChatClient::new("http://127.0.0.1:9");
        let err = client.send("1", Some("   "), None).await.unwrap_err();
        assert_eq!(err, ChatError::EmptySubmission);
    }
}
