use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{AppError, Result};

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_STATE_DIR: &str = ".chat_sync";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Runtime settings, read from the environment (and `.env` via `dotenvy`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    pub state_dir: PathBuf,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = lookup("CHAT_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let state_dir = lookup("CHAT_STATE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        let timeout_secs = match lookup("CHAT_REQUEST_TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT_SECS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(AppError::Config {
                        message: format!("CHAT_REQUEST_TIMEOUT_SECS must be a positive integer, got '{raw}'"),
                    })
                }
            },
        };

        Ok(Self {
            api_base_url,
            state_dir,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("CHAT_API_BASE_URL", "http://chat.internal/api"),
            ("CHAT_STATE_DIR", "/tmp/chat"),
            ("CHAT_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.api_base_url, "http://chat.internal/api");
        assert_eq!(config.state_dir, PathBuf::from("/tmp/chat"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        for raw in ["0", "soon", "-3"] {
            let err = Config::from_lookup(lookup(&[("CHAT_REQUEST_TIMEOUT_SECS", raw)])).unwrap_err();
            assert!(matches!(err, AppError::Config { .. }));
        }
    }
}
