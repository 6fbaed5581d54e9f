use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use estate_client::{ClientConfig, DEFAULT_BASE_URL};

const DEFAULT_STATE_DIR: &str = ".estate";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub state_dir: PathBuf,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("ESTATE_API_URL")
            .map(|value| value.trim().to_string())
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let connect_timeout_secs = parse_u64_env("ESTATE_CONNECT_TIMEOUT_SECS", 5)?;
        let request_timeout_secs = parse_u64_env("ESTATE_REQUEST_TIMEOUT_SECS", 15)?;
        let cache_ttl_secs = parse_u64_env("ESTATE_CACHE_TTL_SECS", 300)?;
        let state_dir = std::env::var("ESTATE_STATE_DIR")
            .unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string())
            .into();
        let log_level = std::env::var("LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_url,
            connect_timeout_secs,
            request_timeout_secs,
            cache_ttl_secs,
            state_dir,
            log_level,
        })
    }

    /// Настройки библиотеки; `server` из флага `--server` важнее переменной окружения.
    pub fn client_config(&self, server: Option<String>) -> ClientConfig {
        let base_url = normalize_server(server.unwrap_or_else(|| self.api_url.clone()));
        ClientConfig {
            base_url,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

pub fn normalize_server(server: String) -> String {
    let server = server.trim().trim_end_matches('/').to_string();
    if server.starts_with("http://") || server.starts_with("https://") {
        return server;
    }

    format!("http://{server}")
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64> {
    parse_u64(key, std::env::var(key).ok(), default)
}

fn parse_u64(key: &str, raw: Option<String>, default: u64) -> Result<u64> {
    let value = raw
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?;

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            api_url: "https://api.example.com".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 15,
            cache_ttl_secs: 300,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn normalize_server_keeps_scheme() {
        let s = normalize_server("https://example.com:8443/".to_string());
        assert_eq!(s, "https://example.com:8443");
    }

    #[test]
    fn normalize_server_adds_http_scheme() {
        let s = normalize_server("127.0.0.1:8000".to_string());
        assert_eq!(s, "http://127.0.0.1:8000");
    }

    #[test]
    fn parse_u64_uses_default_when_missing() {
        let value = parse_u64("ESTATE_CACHE_TTL_SECS", None, 300).expect("default");
        assert_eq!(value, 300);
    }

    #[test]
    fn parse_u64_rejects_zero_and_garbage() {
        assert!(parse_u64("ESTATE_CACHE_TTL_SECS", Some("0".to_string()), 300).is_err());
        assert!(parse_u64("ESTATE_CACHE_TTL_SECS", Some("soon".to_string()), 300).is_err());
    }

    #[test]
    fn client_config_prefers_server_flag() {
        let config = settings().client_config(Some("localhost:9000".to_string()));
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.cache_ttl, Duration::from_secs(300));

        let config = settings().client_config(None);
        assert_eq!(config.base_url, "https://api.example.com");
    }
}
