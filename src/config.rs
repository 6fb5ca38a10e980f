//! Application configuration, derived from the environment.

use std::env;
use std::time::Duration;

use anyhow::{bail, Result};

/// Which speech/translation backends to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechBackend {
    /// Offline mock adapters; no external services required.
    Mock,
    /// Remote STT server plus HTTP translation endpoint.
    Remote,
}

/// Root configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub speech: SpeechConfig,
    /// Base URL the viewer share links are built from.
    pub viewer_base_url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub backend: SpeechBackend,
    /// Address of the streaming STT server, "host:port".
    pub stt_server_addr: String,
    pub translate_api_url: String,
    pub translate_api_key: String,
    pub connect_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables, with defaults that
    /// make `SPEECH_BACKEND=mock` runnable out of the box.
    pub fn load() -> Result<Self> {
        let backend = match get_env("SPEECH_BACKEND", "mock").to_ascii_lowercase().as_str() {
            "mock" => SpeechBackend::Mock,
            "remote" => SpeechBackend::Remote,
            other => bail!("unknown SPEECH_BACKEND: {other}"),
        };

        let config = Self {
            server: ServerConfig {
                port: get_env_as_u16("APP_PORT", 8080)?,
                allowed_origins: get_env_as_list(
                    "CORS_ALLOWED_ORIGINS",
                    &["http://localhost:3000"],
                ),
            },
            speech: SpeechConfig {
                backend,
                stt_server_addr: get_env("STT_SERVER_ADDR", "localhost:43007"),
                translate_api_url: get_env("TRANSLATE_API_URL", ""),
                translate_api_key: get_env("TRANSLATE_API_KEY", ""),
                connect_timeout: Duration::from_secs(10),
            },
            viewer_base_url: get_env("VIEWER_BASE_URL", "http://localhost:3000"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("APP_PORT must be non-zero");
        }
        if self.viewer_base_url.is_empty() {
            bail!("VIEWER_BASE_URL must be configured");
        }
        if self.speech.backend == SpeechBackend::Remote {
            if self.speech.stt_server_addr.is_empty() {
                bail!("STT_SERVER_ADDR must be configured for the remote backend");
            }
            if self.speech.translate_api_url.is_empty() {
                bail!("TRANSLATE_API_URL must be configured for the remote backend");
            }
        }
        Ok(())
    }
}

fn get_env(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn get_env_as_u16(key: &str, default: u16) -> Result<u16> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid {key}: {value}"))?),
        _ => Ok(default),
    }
}

fn get_env_as_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_backend_requires_endpoints() {
        let mut config = Config {
            server: ServerConfig {
                port: 8080,
                allowed_origins: vec![],
            },
            speech: SpeechConfig {
                backend: SpeechBackend::Remote,
                stt_server_addr: "localhost:43007".to_string(),
                translate_api_url: String::new(),
                translate_api_key: String::new(),
                connect_timeout: Duration::from_secs(10),
            },
            viewer_base_url: "http://localhost:3000".to_string(),
        };
        assert!(config.validate().is_err());

        config.speech.translate_api_url = "http://localhost:9000".to_string();
        assert!(config.validate().is_ok());

        config.speech.backend = SpeechBackend::Mock;
        config.speech.translate_api_url = String::new();
        assert!(config.validate().is_ok());
    }
}
