//! Chat front-end: public API.
//!
//! The backend is an opaque request/response service; this module holds
//! the client for it, the local request gate, upload validation, the
//! per-thread display cache and the panel that ties them together.

mod client;
mod gate;
mod panel;
mod thread;
mod validate;

pub use client::{Attachment, ChatClient, NO_VALID_RESPONSE};
pub use gate::{Pending, RequestGate};
pub use panel::{ChatPanel, Composer};
pub use thread::{ChatMessage, ChatThread, Role, ThreadView, WELCOME_MESSAGE};
pub use validate::{validate_submission, validate_upload, DEFAULT_MAX_UPLOAD_BYTES};

/// Everything that can go wrong on the chat side. The `Display` text is
/// what the user sees, so backend reasons pass through verbatim.
///
/// `Clone` because one result may be shared by de-duplicated callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Network(String),

    #[error("Malformed response from backend: {0}")]
    Decode(String),

    #[error("Please wait a moment before sending another message.")]
    RateLimited,

    #[error("Message and image both are empty")]
    EmptySubmission,

    #[error("Please select a valid image file (JPEG, PNG, GIF, etc.)")]
    UnsupportedFileType(String),

    #[error(
        "Image file is too large. Please select an image smaller than {}MB.",
        max / (1024 * 1024)
    )]
    FileTooLarge { size: u64, max: u64 },

    #[error("Attachment could not be read: {0}")]
    InvalidAttachment(String),
}
