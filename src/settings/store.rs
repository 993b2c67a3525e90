//! JSON key-value settings file. Values are opaque JSON; the API token is
//! stored encrypted under `apiToken`.

use super::crypto::{decrypt_token, encrypt_token};
use super::SettingsError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const TOKEN_KEY: &str = "apiToken";

/// `<config dir>/snip-sidebar/settings.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snip-sidebar")
        .join("settings.json")
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl SettingsStore {
    /// Load the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Map::new(),
            Ok(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => return Err(SettingsError::NotAnObject(path)),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        log::debug!("[SETTINGS] Loaded {} keys from {}", values.len(), path.display());
        Ok(Self { path, values })
    }

    pub fn open_default() -> Result<Self, SettingsError> {
        Self::open(default_settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a value and write the file.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), value);
        self.save()
    }

    /// Remove a value and write the file. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> Result<bool, SettingsError> {
        let existed = self.values.remove(key).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    pub fn save_token(&mut self, token: &str) -> Result<(), SettingsError> {
        let sealed = encrypt_token(token)?;
        self.set(TOKEN_KEY, Value::String(sealed))?;
        log::info!("[SETTINGS] API token saved");
        Ok(())
    }

    pub fn load_token(&self) -> Result<Option<String>, SettingsError> {
        match self.values.get(TOKEN_KEY) {
            Some(Value::String(sealed)) => decrypt_token(sealed).map(Some),
            Some(_) => Err(SettingsError::Decrypt("token is not a string".into())),
            None => Ok(None),
        }
    }

    fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&self.values)?;
        // Atomic replace.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json")).unwrap();
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn values_persist_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut store = SettingsStore::open(&path).unwrap();
        store.set("sidebarWidth", json!(480)).unwrap();
        store.set("theme", json!("dark")).unwrap();
        assert!(store.remove("theme").unwrap());
        assert!(!store.remove("theme").unwrap());

        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get("sidebarWidth"), Some(&json!(480)));
        assert!(reopened.get("theme").is_none());
    }

    #[test]
    fn token_is_never_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut store = SettingsStore::open(&path).unwrap();
        store.save_token("super-secret").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("super-secret"));
        let reopened = SettingsStore::open(&path).unwrap();
        assert_eq!(reopened.load_token().unwrap().as_deref(), Some("super-secret"));
    }

    #[test]
    fn non_object_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            SettingsStore::open(&path),
            Err(SettingsError::NotAnObject(_))
        ));
    }
}
