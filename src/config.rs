//! Runtime configuration from the environment (and `.env`, if present).

use crate::chat::DEFAULT_MAX_UPLOAD_BYTES;
use crate::coordinator::Timings;
use crate::protocol::DEFAULT_SIDEBAR_WIDTH;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the chat backend, without the `/chat` path.
    pub backend_url: String,
    pub thread_id: String,
    pub sidebar_width: u32,
    pub min_request_interval: Duration,
    pub max_upload_bytes: u64,
    pub request_timeout: Duration,
    pub timings: Timings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:5000".to_string(),
            thread_id: "1".to_string(),
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
            min_request_interval: Duration::from_millis(1000),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout: Duration::from_secs(60),
            timings: Timings::default(),
        }
    }
}

impl AppConfig {
    /// Read `SNIP_*` variables, loading `.env` first. Missing or
    /// unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("[CONFIG] Loaded {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            backend_url: read("SNIP_BACKEND_URL").unwrap_or(defaults.backend_url),
            thread_id: read("SNIP_THREAD_ID").unwrap_or(defaults.thread_id),
            sidebar_width: parse_or(&read, "SNIP_SIDEBAR_WIDTH", defaults.sidebar_width),
            min_request_interval: Duration::from_millis(parse_or(
                &read,
                "SNIP_MIN_REQUEST_INTERVAL_MS",
                defaults.min_request_interval.as_millis() as u64,
            )),
            max_upload_bytes: parse_or(&read, "SNIP_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            request_timeout: Duration::from_secs(parse_or(
                &read,
                "SNIP_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            timings: timings_from(&read, defaults.timings),
        }
    }
}

fn timings_from(read: &impl Fn(&str) -> Option<String>, defaults: Timings) -> Timings {
    let millis = |key: &str, default: Duration| {
        Duration::from_millis(parse_or(read, key, default.as_millis() as u64))
    };
    Timings {
        ready_push: millis("SNIP_READY_PUSH_MS", defaults.ready_push),
        inject_retry: millis("SNIP_INJECT_RETRY_MS", defaults.inject_retry),
        navigation: millis("SNIP_NAVIGATION_DELAY_MS", defaults.navigation),
        activation: millis("SNIP_ACTIVATION_DELAY_MS", defaults.activation),
        readiness_timeout: millis("SNIP_READINESS_TIMEOUT_MS", defaults.readiness_timeout),
    }
}

fn parse_or<T: FromStr>(read: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match read(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("[CONFIG] {}={:?} is not valid, using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(from_pairs(&[]), AppConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = from_pairs(&[
            ("SNIP_BACKEND_URL", "https://chat.example.test"),
            ("SNIP_THREAD_ID", "42"),
            ("SNIP_SIDEBAR_WIDTH", "520"),
            ("SNIP_MIN_REQUEST_INTERVAL_MS", "250"),
            ("SNIP_REQUEST_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(config.backend_url, "https://chat.example.test");
        assert_eq!(config.thread_id, "42");
        assert_eq!(config.sidebar_width, 520);
        assert_eq!(config.min_request_interval, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn settle_delays_can_be_tuned() {
        let config = from_pairs(&[
            ("SNIP_READY_PUSH_MS", "0"),
            ("SNIP_NAVIGATION_DELAY_MS", "250"),
            ("SNIP_READINESS_TIMEOUT_MS", "soon"),
        ]);
        assert_eq!(config.timings.ready_push, Duration::ZERO);
        assert_eq!(config.timings.navigation, Duration::from_millis(250));
        assert_eq!(config.timings.readiness_timeout, Timings::default().readiness_timeout);
        assert_eq!(config.timings.activation, Timings::default().activation);
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let config = from_pairs(&[("SNIP_SIDEBAR_WIDTH", "wide"), ("SNIP_MAX_UPLOAD_BYTES", "-1")]);
        assert_eq!(config.sidebar_width, DEFAULT_SIDEBAR_WIDTH);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }
}
