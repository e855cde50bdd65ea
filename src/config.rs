// QueryCut Configuration
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Defaults, then an optional JSON file, then environment overrides.
// The completion credential is read once here and handed to the resolver.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "querycut.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no API key for the completion endpoint (set QUERYCUT_API_KEY or GROQ_API_KEY)")]
    MissingCredential,
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("could not build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.1-70b-versatile".to_string(),
            temperature: 1.0,
            max_tokens: 1024,
            top_p: 1.0,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingCredential),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Fade-in and fade-out length at each span's own boundaries
    pub fade_duration: f64,
    /// Used when the source does not report a frame rate
    pub default_frame_rate: f64,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            fade_duration: 0.5,
            default_frame_rate: 24.0,
            crf: 23,
            preset: "faster".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub model_name: String,
    pub use_gpu: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model_name: "base.en".to_string(),
            use_gpu: false,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerycutConfig {
    pub llm: LlmConfig,
    pub assembly: AssemblyConfig,
    pub transcription: TranscriptionConfig,
}

impl QuerycutConfig {
    /// Load from `path` (or `querycut.json` if it exists), then apply the
    /// process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                info!("[CONFIG] Using default configuration");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("[CONFIG] Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply `QUERYCUT_*` overrides through `lookup` (the environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("QUERYCUT_API_URL") {
            self.llm.api_url = url;
        }
        if let Some(key) = lookup("QUERYCUT_API_KEY").or_else(|| lookup("GROQ_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("QUERYCUT_MODEL") {
            self.llm.model = model;
        }
        if let Some(raw) = lookup("QUERYCUT_TIMEOUT_SECS") {
            self.llm.timeout_secs = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("QUERYCUT_TIMEOUT_SECS is not a number: {}", raw))
            })?;
        }
        if let Some(model) = lookup("QUERYCUT_WHISPER_MODEL") {
            self.transcription.model_name = model;
        }
        if let Some(dir) = lookup("QUERYCUT_CACHE_DIR") {
            self.transcription.cache_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Range checks only. The credential is checked when a completion client
    /// is built, since not every command talks to the model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fade = self.assembly.fade_duration;
        if !fade.is_finite() || fade < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fade_duration must be >= 0, got {}",
                fade
            )));
        }
        let fps = self.assembly.default_frame_rate;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_frame_rate must be > 0, got {}",
                fps
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be > 0".into()));
        }
        if self.llm.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_url is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = QuerycutConfig::default();
        assert_eq!(config.assembly.fade_duration, 0.5);
        assert_eq!(config.assembly.default_frame_rate, 24.0);
        assert_eq!(config.llm.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("QUERYCUT_API_URL", "http://localhost:11434/v1"),
            ("GROQ_API_KEY", "groq-key"),
            ("QUERYCUT_MODEL", "llama3:latest"),
            ("QUERYCUT_TIMEOUT_SECS", "5"),
        ]);
        let mut config = QuerycutConfig::default();
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.llm.api_url, "http://localhost:11434/v1");
        assert_eq!(config.llm.require_api_key().unwrap(), "groq-key");
        assert_eq!(config.llm.model, "llama3:latest");
        assert_eq!(config.llm.timeout_secs, 5);
    }

    #[test]
    fn test_querycut_key_wins_over_groq_key() {
        let vars = env(&[("QUERYCUT_API_KEY", "primary"), ("GROQ_API_KEY", "secondary")]);
        let mut config = QuerycutConfig::default();
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_bad_timeout_override() {
        let vars = env(&[("QUERYCUT_TIMEOUT_SECS", "soon")]);
        let mut config = QuerycutConfig::default();
        assert!(matches!(
            config.apply_overrides(|k| vars.get(k).cloned()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_blank_key_is_missing() {
        let config = LlmConfig {
            api_key: Some("   ".into()),
            ..LlmConfig::default()
        };
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("querycut.json");
        fs::write(&path, r#"{"assembly": {"fade_duration": 0.25}}"#).unwrap();

        let config = QuerycutConfig::from_file(&path).unwrap();
        assert_eq!(config.assembly.fade_duration, 0.25);
        assert_eq!(config.assembly.default_frame_rate, 24.0);
        assert_eq!(config.llm.max_tokens, 1024);
    }

    #[test]
    fn test_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("querycut.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            QuerycutConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut config = QuerycutConfig::default();
        config.assembly.fade_duration = -1.0;
        assert!(config.validate().is_err());

        let mut config = QuerycutConfig::default();
        config.assembly.default_frame_rate = 0.0;
        assert!(config.validate().is_err());
    }
}
