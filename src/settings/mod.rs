//! Encrypted key-value settings.

mod crypto;
mod store;

pub use crypto::{decrypt_token, encrypt_token};
pub use store::{default_settings_path, SettingsStore};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings file {} is not a JSON object", .0.display())]
    NotAnObject(PathBuf),

    #[error("Failed to encrypt token")]
    Encrypt,

    #[error("Failed to decrypt token: {0}")]
    Decrypt(String),
}
