use assistant_core::{AssistantError, Result, Settings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub mod env_substitution;

pub use env_substitution::substitute_env_vars;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub paths: PathSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl AssistantConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AssistantError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // Parse into a generic document first so `${VAR}` references can be
        // expanded before the typed view is built.
        let mut document: serde_json::Value = if yaml.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_yaml::from_str(yaml)
                .map_err(|e| AssistantError::Config(format!("Failed to parse YAML: {}", e)))?
        };
        if document.is_null() {
            document = serde_json::json!({});
        }
        substitute_env_vars(&mut document)?;

        let config: AssistantConfig = serde_json::from_value(document)
            .map_err(|e| AssistantError::Config(format!("Invalid configuration: {}", e)))?;
        validate_settings(&config.settings)?;

        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| AssistantError::Config(format!("Failed to serialize YAML: {}", e)))
    }

    pub fn default_config_path() -> PathBuf {
        home_dir().join(".page-assistant").join("config.yaml")
    }
}

/// Range checks for generation settings.
///
/// The provider id is only checked for presence: whether it names a known
/// provider is decided by the adapter registry at query time.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.provider_id.trim().is_empty() {
        return Err(AssistantError::Config("Provider cannot be empty".into()));
    }
    if settings.model_id.trim().is_empty() {
        return Err(AssistantError::Config("Model cannot be empty".into()));
    }
    if settings.max_tokens == 0 {
        return Err(AssistantError::Config("max_tokens must be greater than 0".into()));
    }
    if !(0.0..=2.0).contains(&settings.temperature) {
        return Err(AssistantError::Config("Temperature must be between 0.0 and 2.0".into()));
    }
    Ok(())
}

/// Reader/writer for the process-wide settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings, or `None` when nothing has been saved yet.
    async fn try_load(&self) -> Result<Option<Settings>>;

    async fn save(&self, settings: &Settings) -> Result<()>;

    async fn load(&self) -> Result<Settings> {
        Ok(self.try_load().await?.unwrap_or_default())
    }
}

/// Settings kept in the YAML config file, next to the path settings.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn try_load(&self) -> Result<Option<Settings>> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!("No config file at {:?}", self.path);
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let config = AssistantConfig::from_yaml_str(&content)?;
        Ok(Some(config.settings))
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        validate_settings(settings)?;

        // Keep whatever path settings the file already carries.
        let mut config = if tokio::fs::try_exists(&self.path).await? {
            let content = tokio::fs::read_to_string(&self.path).await?;
            serde_yaml::from_str::<AssistantConfig>(&content).unwrap_or_default()
        } else {
            AssistantConfig::default()
        };
        config.settings = settings.clone();

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, config.to_yaml()?).await?;

        info!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

/// In-process settings, used by tests and embedders that manage their own.
#[derive(Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Option<Settings>>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(Some(settings)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn try_load(&self) -> Result<Option<Settings>> {
        Ok(self.settings.read().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        validate_settings(settings)?;
        *self.settings.write().await = Some(settings.clone());
        Ok(())
    }
}

fn home_dir() -> PathBuf {
    env::var("HOME_DIR")
        .unwrap_or_else(|_| env::var("HOME").unwrap_or_else(|_| ".".to_string()))
        .into()
}

fn default_data_dir() -> PathBuf {
    home_dir().join(".page-assistant")
}
