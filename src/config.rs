//! Settings file, environment overrides and CLI overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Args;
use crate::error::{ChatError, Result};
use crate::providers::OPENAI_CHAT_URL;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini-2024-07-18";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_PORT: u16 = 8787;
pub const APP_DIR: &str = "pixchat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: String,
    pub temperature: f32,
    pub endpoint: String,
    pub transcript_path: PathBuf,
    pub key_path: PathBuf,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub max_image_bytes: u64,
    /// Send earlier turns along with each message. Off by default: every
    /// request carries only the current message.
    pub include_history: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            endpoint: OPENAI_CHAT_URL.to_string(),
            transcript_path: data_dir().join("transcript.json"),
            key_path: config_dir().join("api_key"),
            port: DEFAULT_PORT,
            request_timeout_secs: 60,
            max_image_bytes: 20 * 1024 * 1024,
            include_history: false,
        }
    }
}

/// `<platform config dir>/pixchat`, or `./.pixchat` when the platform has none.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".pixchat"))
}

/// `<platform data dir>/pixchat`, or `./.pixchat` when the platform has none.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".pixchat"))
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// An explicitly named file must exist; a missing default file just
    /// yields the built-in defaults. Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let p = default_config_path();
                if p.exists() {
                    Self::from_file(&p)?
                } else {
                    Settings::default()
                }
            }
        };
        settings.apply_env(|k| std::env::var(k).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&raw).map_err(|e| match e {
            ChatError::Config(msg) => ChatError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(raw).map_err(|e| ChatError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `PIXCHAT_MODEL` / `PIXCHAT_ENDPOINT`; `lookup` is injectable for tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("PIXCHAT_MODEL").filter(|s| !s.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        if let Some(endpoint) = lookup("PIXCHAT_ENDPOINT").filter(|s| !s.trim().is_empty()) {
            self.endpoint = endpoint.trim().to_string();
        }
    }

    /// CLI flags win over both the file and the environment.
    pub fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(model) = &args.model {
            self.model = model.clone();
        }
        if let Some(t) = args.temperature {
            self.temperature = t;
        }
        if let Some(p) = &args.transcript {
            self.transcript_path = p.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if args.include_history {
            self.include_history = true;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::Config(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "endpoint {:?} must be an http(s) URL",
                self.endpoint
            )));
        }
        if self.max_image_bytes == 0 {
            return Err(ChatError::Config("max_image_bytes must be positive".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.model, "gpt-4o-mini-2024-07-18");
        assert!((s.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(s.endpoint, "https://api.openai.com/v1/chat/completions");
        assert!(!s.include_history);
        assert!(s.transcript_path.ends_with("transcript.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let s = Settings::from_toml("model = \"gpt-4o\"\nport = 9000\n").unwrap();
        assert_eq!(s.model, "gpt-4o");
        assert_eq!(s.port, 9000);
        assert_eq!(s.endpoint, OPENAI_CHAT_URL);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = Settings::from_toml("model = [").unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_out_of_range_temperature_rejected() {
        let err = Settings::from_toml("temperature = 3.5").unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        assert!(Settings::from_toml("endpoint = \"ftp://x\"").is_err());
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let err = Settings::load(Some(Path::new("/nonexistent/pixchat.toml"))).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "include_history = true\n").unwrap();
        let s = Settings::from_file(&path).unwrap();
        assert!(s.include_history);
    }

    #[test]
    fn test_env_overrides() {
        let mut s = Settings::default();
        s.apply_env(|k| match k {
            "PIXCHAT_MODEL" => Some(" gpt-4.1 ".to_string()),
            "PIXCHAT_ENDPOINT" => Some("http://localhost:1234/v1/chat/completions".to_string()),
            _ => None,
        });
        assert_eq!(s.model, "gpt-4.1");
        assert_eq!(s.endpoint, "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn test_blank_env_ignored() {
        let mut s = Settings::default();
        s.apply_env(|_| Some("   ".to_string()));
        assert_eq!(s.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_args_override() {
        let args = Args::parse_from([
            "pixchat",
            "--model",
            "gpt-4o",
            "--temperature",
            "0.2",
            "--port",
            "9999",
            "--include-history",
        ]);
        let mut s = Settings::default();
        s.apply_args(&args).unwrap();
        assert_eq!(s.model, "gpt-4o");
        assert!((s.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(s.port, 9999);
        assert!(s.include_history);
    }

    #[test]
    fn test_args_override_validated() {
        let args = Args::parse_from(["pixchat", "--temperature", "9"]);
        let mut s = Settings::default();
        assert!(s.apply_args(&args).is_err());
    }
}
