//! The chat panel living inside the overlay: composer, transcript and the
//! glue to the backend.

use super::client::{Attachment, ChatClient};
use super::gate::RequestGate;
use super::thread::{ChatMessage, ChatThread, ThreadView};
use super::validate::{validate_submission, validate_upload};
use super::ChatError;
use crate::config::AppConfig;
use crate::protocol::OverlayMessage;
use std::sync::Arc;

const CAPTURED_FILE_NAME: &str = "captured-image.png";

/// Text box plus the staged attachment. An attachment is sent at most once.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    text: String,
    attachment: Option<Attachment>,
    attachment_used: bool,
    notice: Option<String>,
}

impl Composer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.notice = None;
    }

    pub fn stage(&mut self, attachment: Attachment) {
        self.attachment = Some(attachment);
        self.attachment_used = false;
    }

    /// The staged attachment, unless it already went out with a message.
    pub fn unused_attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref().filter(|_| !self.attachment_used)
    }

    pub fn remove_attachment(&mut self) {
        self.attachment = None;
        self.attachment_used = false;
    }

    /// Inline message shown under the input (validation, rate limit).
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}

pub struct ChatPanel {
    client: ChatClient,
    gate: Arc<RequestGate>,
    view: ThreadView,
    composer: Composer,
    max_upload_bytes: u64,
    loading: bool,
}

impl ChatPanel {
    pub fn new(
        client: ChatClient,
        gate: Arc<RequestGate>,
        thread: ChatThread,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            client,
            gate,
            view: ThreadView::new(thread),
            composer: Composer::default(),
            max_upload_bytes,
            loading: false,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ChatError> {
        Ok(Self::new(
            ChatClient::from_config(config)?,
            Arc::new(RequestGate::new(config.min_request_interval)),
            ChatThread::new(config.thread_id.clone(), "Default"),
            config.max_upload_bytes,
        ))
    }

    pub fn view(&self) -> &ThreadView {
        &self.view
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Switch to another thread and load its history.
    pub async fn open_thread(&mut self, thread: ChatThread) {
        self.view = ThreadView::new(thread);
        self.load_history().await;
    }

    /// React to a message the replica posted into the overlay.
    pub async fn on_overlay_message(&mut self, message: OverlayMessage) -> Result<(), ChatError> {
        match message {
            OverlayMessage::SetImage { image_data } => self.attach_data_url(&image_data),
            OverlayMessage::RefreshChatHistory => {
                self.load_history().await;
                Ok(())
            }
        }
    }

    /// Stage a captured image for the next message.
    pub fn attach_data_url(&mut self, url: &str) -> Result<(), ChatError> {
        let attachment = Attachment::from_data_url(url, CAPTURED_FILE_NAME)?;
        self.attach(attachment)
    }

    /// Stage an uploaded file. Rejections land in the transcript.
    pub fn attach_file(
        &mut self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ChatError> {
        self.attach(Attachment::new(file_name, mime_type, bytes))
    }

    fn attach(&mut self, attachment: Attachment) -> Result<(), ChatError> {
        if let Err(e) = validate_upload(&attachment.mime_type, attachment.size(), self.max_upload_bytes) {
            log::warn!("[CHAT] Upload rejected: {}", e);
            self.view.push(ChatMessage::assistant(e.to_string()));
            return Err(e);
        }
        log::debug!("[CHAT] Staged {} ({} bytes)", attachment.file_name, attachment.size());
        self.composer.stage(attachment);
        Ok(())
    }

    /// Replace the transcript with the backend's history for this thread.
    /// Failures and empty history show the welcome message.
    pub async fn load_history(&mut self) {
        match self.client.history(&self.view.thread().id).await {
            Ok(messages) => self.view.replace_history(messages),
            Err(e) => {
                log::error!("[CHAT] Failed to load history: {}", e);
                self.view.show_welcome();
            }
        }
    }

    /// Send the composer's contents. The user message is shown before the
    /// network call; the reply or `Error: <reason>` follows it.
    pub async fn send(&mut self) -> Result<String, ChatError> {
        let text = self.composer.text.trim().to_string();
        let attachment = self.composer.unused_attachment().cloned();

        if let Err(e) = validate_submission(&text, attachment.is_some()) {
            self.composer.notice = Some(e.to_string());
            return Err(e);
        }

        let key = match &attachment {
            Some(image) => format!("{}#{}", text, image.fingerprint()),
            None => text.clone(),
        };
        let shown_image = attachment.as_ref().map(Attachment::to_data_url);
        let client = self.client.clone();
        let thread_id = self.view.thread().id.clone();
        let message = (!text.is_empty()).then(|| text.clone());
        let outgoing = attachment.clone();

        let pending = self.gate.submit(&key, move || async move {
            client
                .send(&thread_id, message.as_deref(), outgoing.as_ref())
                .await
        });
        let pending = match pending {
            Ok(pending) => pending,
            Err(e) => {
                self.composer.notice = Some(e.to_string());
                return Err(e);
            }
        };

        self.view.push(ChatMessage::user(text, shown_image));
        self.composer.text.clear();
        self.composer.notice = None;
        if attachment.is_some() {
            self.composer.attachment_used = true;
        }

        self.loading = true;
        let result = self.gate.finish(pending).await;
        self.loading = false;

        match &result {
            Ok(reply) => self.view.push(ChatMessage::assistant(reply.clone())),
            Err(e) => self.view.push(ChatMessage::assistant(format!("Error: {}", e))),
        }
        result
    }
}
