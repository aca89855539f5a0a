use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::backend::openai;
use crate::error::ConfigError;
use crate::pacing;

/// Settings remembered between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Base per-word delay, milliseconds.
    pub delay_ms: u64,
    pub mute: bool,
    /// A `flashread serve` instance to use instead of calling the model directly.
    pub backend_url: Option<String>,
    pub ai_base_url: String,
    pub ai_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay_ms: pacing::DEFAULT_DELAY_MS,
            mute: false,
            backend_url: None,
            ai_base_url: openai::DEFAULT_BASE_URL.to_string(),
            ai_model: openai::DEFAULT_MODEL.to_string(),
        }
    }
}

pub trait ConfigStore: Send {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path().unwrap_or_else(|| PathBuf::from("flashread_config.json")),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or unreadable files give the defaults.
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(mut cfg) => {
                cfg.delay_ms = pacing::clamp_delay(cfg.delay_ms);
                cfg
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "ignoring corrupt config: {}", e);
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            delay_ms: 250,
            mute: true,
            backend_url: Some("http://127.0.0.1:8787".into()),
            ai_base_url: "http://localhost:11434/v1".into(),
            ai_model: "llama3".into(),
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"delay_ms": 5000}"#).unwrap();
        let loaded = FileConfigStore::with_path(&path).load();
        assert_eq!(loaded.delay_ms, pacing::MAX_DELAY_MS);
        assert!(!loaded.mute);
        assert_eq!(loaded.ai_model, openai::DEFAULT_MODEL);
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }
}
