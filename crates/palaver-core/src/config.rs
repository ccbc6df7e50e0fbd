use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PalaverError, Result};
use crate::types::{ModelCatalog, QueryConfig};

/// Top-level configuration for Palaver.
///
/// Loaded from `~/.palaver/config.toml` by default. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PalaverConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub models: ModelCatalog,
}

impl PalaverConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PalaverConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject configurations the chat engine could not start from.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(PalaverError::Config(
                "at least one [[models]] entry is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for model in self.models.iter() {
            if !seen.insert(model.id.as_str()) {
                return Err(PalaverError::Config(format!(
                    "duplicate model id in [[models]]: {}",
                    model.id
                )));
            }
        }
        if self.chat.error_log_capacity == 0 {
            return Err(PalaverError::Config(
                "chat.error_log_capacity must be at least 1".to_string(),
            ));
        }
        if self.heartbeat.enabled && self.heartbeat.interval_secs == 0 {
            return Err(PalaverError::Config(
                "heartbeat.interval_secs must be at least 1".to_string(),
            ));
        }
        self.query
            .validate(&self.models, self.chat.history_token_reserve)
            .map_err(|e| PalaverError::Config(format!("[query] {e}")))
    }

    /// Data directory with a leading `~/` expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Heartbeat file path with a leading `~/` expanded.
    pub fn heartbeat_path(&self) -> PathBuf {
        expand_home(&self.heartbeat.path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root directory for topic histories and user records.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.palaver/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Conversation settings shared by every user's engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Character budget for history replayed into each chat prompt.
    pub history_word_limit: usize,
    /// Tokens held back from `max_tokens` for the replayed history.
    pub history_token_reserve: u32,
    /// Framing text placed at the top of every chat prompt.
    pub intro_message: String,
    /// Failed requests kept for `/dev`.
    pub error_log_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_word_limit: 1000,
            history_token_reserve: 1000,
            intro_message: "The following is a conversation with an AI assistant [BOT]. \
                            The assistant is helpful, creative, clever, and very friendly.\n"
                .to_string(),
            error_log_capacity: 20,
        }
    }
}

/// Liveness file touched periodically by the running binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub path: String,
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/heartbeat/palaver_last_alive".to_string(),
            interval_secs: 60,
        }
    }
}

/// Expand a leading `~/` using `HOME` (or `USERPROFILE` on Windows).
///
/// Paths without the prefix, or with no home variable set, are returned as-is.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = PalaverConfig::default();
        assert_eq!(config.general.data_dir, "~/.palaver/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.chat.history_word_limit, 1000);
        assert_eq!(config.chat.history_token_reserve, 1000);
        assert_eq!(config.chat.error_log_capacity, 20);
        assert!(config.chat.intro_message.contains("[BOT]"));
        assert_eq!(config.query, QueryConfig::default());
        assert_eq!(config.models.len(), 5);
        assert!(config.heartbeat.enabled);
        assert_eq!(config.heartbeat.interval_secs, 60);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_empty_file_gives_defaults() {
        let file = create_temp_config("");
        let config = PalaverConfig::load(file.path()).unwrap();
        assert_eq!(config.query.max_tokens, 512);
        assert_eq!(config.models.len(), 5);
    }

    #[test]
    fn test_load_partial_config() {
        let toml_content = r#"
[general]
data_dir = "/tmp/palaver"

[query]
temperature = 0.2

[[models]]
id = "local-small"
context_window = 2048
"#;
        let file = create_temp_config(toml_content);
        let config = PalaverConfig::load(file.path()).unwrap();

        assert_eq!(config.general.data_dir, "/tmp/palaver");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.query.temperature, 0.2);
        assert_eq!(config.query.max_tokens, 512);
        assert_eq!(config.models.ids(), vec!["local-small"]);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/palaver"));
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let file = create_temp_config("[general\ndata_dir = ");
        let err = PalaverConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, PalaverError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = PalaverConfig::load_or_default(Path::new("/nonexistent/palaver.toml"));
        assert_eq!(config.general.data_dir, "~/.palaver/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PalaverConfig::default();
        config.general.log_level = "debug".to_string();
        config.query.temperature = 0.4;
        config.save(&path).unwrap();

        let reloaded = PalaverConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.log_level, "debug");
        assert_eq!(reloaded.query.temperature, 0.4);
        assert_eq!(reloaded.models, config.models);
    }

    #[test]
    fn test_cleared_stop_survives_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = PalaverConfig::default();
        config.query.set_stop(None);
        config.save(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("stop = \"none\""));

        let reloaded = PalaverConfig::load(&path).unwrap();
        assert!(reloaded.query.stop.is_none());

        PalaverConfig::default().save(&path).unwrap();
        let reloaded = PalaverConfig::load(&path).unwrap();
        assert_eq!(reloaded.query.stop.as_deref(), Some("\n"));
    }

    #[test]
    fn test_validate_rejects_bad_query_defaults() {
        let mut config = PalaverConfig::default();
        config.query.temperature = 1.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PalaverError::Config(_)));
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_validate_rejects_unknown_default_model() {
        let mut config = PalaverConfig::default();
        config.query.model = "gpt-9".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("gpt-9"));
    }

    #[test]
    fn test_validate_rejects_duplicate_models_and_empty_catalog() {
        let mut config = PalaverConfig::default();
        config.models = ModelCatalog::new(vec![]);
        assert!(config.validate().is_err());

        let toml_content = r#"
[[models]]
id = "text-davinci-003"
context_window = 4097

[[models]]
id = "text-davinci-003"
context_window = 4097
"#;
        let file = create_temp_config(toml_content);
        let config = PalaverConfig::load(file.path()).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/lib/palaver"), PathBuf::from("/var/lib/palaver"));
        assert_eq!(expand_home("relative/dir"), PathBuf::from("relative/dir"));
    }
}
