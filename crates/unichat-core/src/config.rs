use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ai::OllamaClient;
use crate::session::{Preambles, Session, DEFAULT_PREAMBLE};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODELS: &[&str] = &["llama3", "phi3"];
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// On-disk configuration. Every field is optional; see [`Config::settings`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub preambles: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub endpoint: String,
    pub models: Vec<String>,
    pub default_model: String,
    pub preamble: String,
    pub preambles: HashMap<String, String>,
    pub timeout: Duration,
}

impl Config {
    /// Read the config at `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Remember `model` as the starting model, keeping every other field.
    ///
    /// An unreadable file is reported and left untouched.
    pub fn save_default_model(path: &Path, model: &str) -> Result<()> {
        let mut config = Self::load_from(path)?;
        config.default_model = Some(model.to_string());
        config.save_to(path)
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("unichat").join("config.json"))
    }

    pub fn settings(&self) -> Settings {
        let models: Vec<String> = match &self.models {
            Some(models) if !models.is_empty() => models.clone(),
            _ => DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        };

        let default_model = self
            .default_model
            .as_ref()
            .filter(|m| models.contains(m))
            .cloned()
            .unwrap_or_else(|| models[0].clone());

        Settings {
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            models,
            default_model,
            preamble: self
                .preamble
                .clone()
                .unwrap_or_else(|| DEFAULT_PREAMBLE.to_string()),
            preambles: self.preambles.clone(),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

impl Settings {
    /// Make `model` the starting model, adding it to the list if needed.
    pub fn select_model(&mut self, model: &str) {
        if !self.models.iter().any(|m| m == model) {
            self.models.push(model.to_string());
        }
        self.default_model = model.to_string();
    }

    pub fn preambles(&self) -> Preambles {
        self.preambles
            .iter()
            .fold(Preambles::new(self.preamble.clone()), |acc, (model, text)| {
                acc.with_override(model.clone(), text.clone())
            })
    }

    pub fn client(&self) -> crate::error::Result<OllamaClient> {
        OllamaClient::new(&self.endpoint, self.timeout)
    }

    pub fn session(&self) -> Session {
        Session::new(self.default_model.clone(), self.preambles())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_reference_setup() {
        let settings = Config::default().settings();
        assert_eq!(settings.endpoint, "http://localhost:11434");
        assert_eq!(settings.models, vec!["llama3", "phi3"]);
        assert_eq!(settings.default_model, "llama3");
        assert_eq!(settings.timeout, Duration::from_secs(180));
        assert_eq!(settings.session().transcript(), DEFAULT_PREAMBLE);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_save_default_model_keeps_other_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            models: Some(vec!["llama3".into(), "phi3".into(), "mistral".into()]),
            timeout_secs: Some(30),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        Config::save_default_model(&path, "mistral").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_model.as_deref(), Some("mistral"));
        assert_eq!(loaded.timeout_secs, Some(30));
        assert_eq!(loaded.settings().default_model, "mistral");
    }

    #[test]
    fn test_save_default_model_leaves_malformed_file_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let original =
            r#"{"endpoint": "http://gpu-box:11434", "models": ["mistral"], "timeout_secs": 30,}"#;
        fs::write(&path, original).unwrap();

        assert!(Config::save_default_model(&path, "phi3").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_save_default_model_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        Config::save_default_model(&path, "phi3").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_model.as_deref(), Some("phi3"));
    }

    #[test]
    fn test_unknown_default_model_falls_back_to_first() {
        let config = Config {
            default_model: Some("gone".into()),
            models: Some(vec!["phi3".into()]),
            ..Default::default()
        };
        assert_eq!(config.settings().default_model, "phi3");
    }

    #[test]
    fn test_empty_model_list_falls_back_to_defaults() {
        let config = Config {
            models: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(config.settings().models, vec!["llama3", "phi3"]);
    }

    #[test]
    fn test_select_model_adds_unknown_model() {
        let mut settings = Config::default().settings();
        settings.select_model("mistral");
        assert_eq!(settings.default_model, "mistral");
        assert_eq!(settings.models.last().map(String::as_str), Some("mistral"));

        settings.select_model("phi3");
        assert_eq!(settings.models.len(), 3);
    }

    #[test]
    fn test_per_model_preamble_from_config() {
        let config: Config = serde_json::from_str(
            r#"{"preamble": "Base.\n", "preambles": {"phi3": "Short answers.\n"}}"#,
        )
        .unwrap();
        let preambles = config.settings().preambles();
        assert_eq!(preambles.for_model("llama3"), "Base.\n");
        assert_eq!(preambles.for_model("phi3"), "Short answers.\n");
    }
}
