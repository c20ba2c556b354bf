use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, YellowTrackerError};

pub const DEFAULT_DB_PATH: &str = "./data/yellow-tracker.db";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3";
pub const DEFAULT_TRANSCRIPTION_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TranscriptionConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    pub sqlite_path: Option<String>,
    /// Keep the ledger in process memory only.
    pub ephemeral: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AssistantConfig {
    pub name: Option<String>,
    pub currencies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PricesConfig {
    pub stock_base_url: Option<String>,
    pub crypto_base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub openai: Option<OpenAiConfig>,
    pub transcription: Option<TranscriptionConfig>,
    pub store: Option<StoreConfig>,
    pub assistant: Option<AssistantConfig>,
    pub prices: Option<PricesConfig>,
    pub token: Option<String>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| YellowTrackerError::Config(e.to_string()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| YellowTrackerError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Loads the file when one is given, otherwise starts from defaults, then
    /// overlays the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.apply_env())
    }

    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| env::var(key).ok())
    }

    pub fn apply_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = var("YELLOW_TRACKER_OPENAI_API_KEY") {
            self.openai.get_or_insert_with(Default::default).api_key = Some(value);
        }
        if let Some(value) = var("YELLOW_TRACKER_OPENAI_MODEL") {
            self.openai.get_or_insert_with(Default::default).model = Some(value);
        }
        if let Some(value) = var("YELLOW_TRACKER_OPENAI_BASE_URL") {
            self.openai.get_or_insert_with(Default::default).base_url = Some(value);
        }
        if let Some(value) = var("YELLOW_TRACKER_TRANSCRIPTION_API_KEY") {
            self.transcription
                .get_or_insert_with(Default::default)
                .api_key = Some(value);
        }
        if let Some(value) = var("YELLOW_TRACKER_DB") {
            self.store.get_or_insert_with(Default::default).sqlite_path = Some(value);
        }
        if let Some(value) = var("YELLOW_TRACKER_TOKEN") {
            self.token = Some(value);
        }
        self
    }

    pub fn sqlite_path(&self) -> String {
        self.store
            .as_ref()
            .and_then(|store| store.sqlite_path.clone())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
    }

    pub fn is_ephemeral(&self) -> bool {
        self.store
            .as_ref()
            .and_then(|store| store.ephemeral)
            .unwrap_or(false)
    }

    pub fn assistant_name(&self) -> String {
        self.assistant
            .as_ref()
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| "Yellow Tracker".to_string())
    }

    pub fn currencies(&self) -> Vec<String> {
        self.assistant
            .as_ref()
            .and_then(|a| a.currencies.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| {
                ["USD", "EUR", "COP", "AED"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_file_values() {
        let config: Config = serde_json::from_str(
            r#"{"openai":{"api_key":"file-key","model":"m1"},"store":{"sqlite_path":"a.db"}}"#,
        )
        .unwrap();
        let vars: HashMap<&str, &str> = [
            ("YELLOW_TRACKER_OPENAI_API_KEY", "env-key"),
            ("YELLOW_TRACKER_DB", "  "),
            ("YELLOW_TRACKER_TOKEN", "secret"),
        ]
        .into_iter()
        .collect();
        let config = config.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        let openai = config.openai.as_ref().unwrap();
        assert_eq!(openai.api_key.as_deref(), Some("env-key"));
        assert_eq!(openai.model.as_deref(), Some("m1"));
        assert_eq!(config.sqlite_path(), "a.db");
        assert_eq!(config.token.as_deref(), Some("secret"));
    }

    #[test]
    fn defaults_apply_when_sections_missing() {
        let config = Config::default();
        assert_eq!(config.sqlite_path(), DEFAULT_DB_PATH);
        assert!(!config.is_ephemeral());
        assert_eq!(config.assistant_name(), "Yellow Tracker");
        assert_eq!(config.currencies(), vec!["USD", "EUR", "COP", "AED"]);
    }

    #[test]
    fn from_file_reports_config_errors() {
        let err = Config::from_file("/nonexistent/yellow.json").unwrap_err();
        assert!(matches!(err, YellowTrackerError::Config(_)));
    }
}
