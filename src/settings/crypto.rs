//! Token encryption for the settings store.
//!
//! AES-256-GCM with a key derived by PBKDF2-HMAC-SHA256 (100 000 rounds)
//! from a fixed key material and a fresh 16-byte salt. The stored form is
//! `base64(salt ‖ iv ‖ ciphertext+tag)`.

use super::SettingsError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

const KEY_MATERIAL: &[u8] = b"extension-secure-storage-key";
const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;

fn derive_key(salt: &[u8]) -> Key<Aes256Gcm> {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(KEY_MATERIAL, salt, PBKDF2_ROUNDS, &mut key);
    key.into()
}

pub fn encrypt_token(token: &str) -> Result<String, SettingsError> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new(&derive_key(&salt));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), token.as_bytes())
        .map_err(|_| SettingsError::Encrypt)?;

    let mut combined = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&iv);
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

pub fn decrypt_token(encoded: &str) -> Result<String, SettingsError> {
    let combined = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SettingsError::Decrypt(e.to_string()))?;
    // An empty plaintext still carries a 16-byte tag.
    if combined.len() < SALT_LEN + IV_LEN + 16 {
        return Err(SettingsError::Decrypt("ciphertext too short".into()));
    }

    let (salt, rest) = combined.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);

    let cipher = Aes256Gcm::new(&derive_key(salt));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| SettingsError::Decrypt("authentication failed".into()))?;

    String::from_utf8(plaintext).map_err(|e| SettingsError::Decrypt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_survives_encryption() {
        let sealed = encrypt_token("flask-backend-token").unwrap();
        assert_eq!(decrypt_token(&sealed).unwrap(), "flask-backend-token");
    }

    #[test]
    fn layout_is_salt_iv_ciphertext() {
        let sealed = encrypt_token("abc").unwrap();
        let raw = STANDARD.decode(sealed).unwrap();
        assert_eq!(raw.len(), SALT_LEN + IV_LEN + 3 + 16);
    }

    #[test]
    fn fresh_salt_every_time() {
        assert_ne!(encrypt_token("same").unwrap(), encrypt_token("same").unwrap());
    }

    #[test]
    fn tampering_is_detected() {
        let mut raw = STANDARD.decode(encrypt_token("secret").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(matches!(
            decrypt_token(&STANDARD.encode(raw)),
            Err(SettingsError::Decrypt(_))
        ));
    }

    #[test]
    fn short_input_is_rejected() {
        assert!(decrypt_token("AAAA").is_err());
        assert!(decrypt_token("not base64!").is_err());
    }
}
