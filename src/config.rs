use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::driver::credentials::CredentialRef;

pub const DEFAULT_CONFIG_FILE: &str = "medtwin.jsonc";

const BUNDLED_SCHEMA: &str = include_str!("../medtwin.schema.json");

pub const ENV_DEFAULT_SOURCE_KEY: &str = "MEDTWIN_RAW_KEY";
pub const ENV_API_BASE: &str = "API_BASE";
pub const ENV_AGENT_ID: &str = "AGENT_ID";
pub const ENV_AGENT_ALIAS_ID: &str = "AGENT_ALIAS_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_bucket() -> String {
    "medimage-digitaltwin".to_string()
}

fn default_source_key() -> String {
    "raw/chestmnist.npz".to_string()
}

fn default_resample_factor() -> usize {
    crate::transforms::DEFAULT_RESAMPLE_FACTOR
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_tokens() -> u32 {
    200
}

fn default_enabled_true() -> bool {
    true
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs/medtwin")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Filesystem {
        #[serde(default = "default_storage_root")]
        root: PathBuf,
        #[serde(default = "default_bucket")]
        bucket: String,
    },
    Memory {
        #[serde(default = "default_bucket")]
        bucket: String,
    },
}

impl StorageConfig {
    pub fn bucket(&self) -> &str {
        match self {
            StorageConfig::Filesystem { bucket, .. } | StorageConfig::Memory { bucket } => bucket,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::Filesystem { .. } => "filesystem",
            StorageConfig::Memory { .. } => "memory",
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Filesystem {
            root: default_storage_root(),
            bucket: default_bucket(),
        }
    }
}

/// Process-wide knobs shared by both stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    #[serde(default = "default_source_key")]
    pub default_source_key: String,
    #[serde(default = "default_resample_factor")]
    pub resample_factor: usize,
    #[serde(default)]
    pub twin_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_source_key: default_source_key(),
            resample_factor: default_resample_factor(),
            twin_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverConfig {
    /// When set, stage calls go over HTTP instead of running in-process.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            request_timeout_ms: default_request_timeout_ms(),
            chat: ChatConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub credential: CredentialRef,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            max_tokens: default_max_tokens(),
            credential: CredentialRef::None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_alias_id: Option<String>,
    #[serde(default)]
    pub credential: CredentialRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema = load_schema(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize medtwin config")?;

        if let StorageConfig::Filesystem { root, .. } = &mut config.storage {
            if !root.is_absolute() {
                *root = config_base.join(&*root);
            }
        }

        Ok(config)
    }

    /// Loads `explicit` when given. Otherwise reads `./medtwin.jsonc` if present and falls
    /// back to built-in defaults when it is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let default_path = std::env::current_dir()
            .context("failed to read current working directory")?
            .join(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies the recognized overrides using `lookup` as the environment. Blank values
    /// are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup(ENV_DEFAULT_SOURCE_KEY) {
            self.pipeline.default_source_key = key;
        }
        if let Some(api_base) = lookup(ENV_API_BASE) {
            self.driver.api_base = Some(api_base);
        }
        if let Some(agent_id) = lookup(ENV_AGENT_ID) {
            self.driver.agent.agent_id = Some(agent_id);
        }
        if let Some(alias_id) = lookup(ENV_AGENT_ALIAS_ID) {
            self.driver.agent.agent_alias_id = Some(alias_id);
        }
    }
}

fn load_schema(config_base: &Path, config_value: &Value) -> Result<Value> {
    let Some(path_text) = config_value.get("$schema").and_then(|value| value.as_str()) else {
        return serde_json::from_str(BUNDLED_SCHEMA).context("failed to parse bundled schema");
    };

    let configured = PathBuf::from(path_text);
    let schema_path = if configured.is_absolute() {
        configured
    } else {
        config_base.join(&configured)
    };
    let schema_content = fs::read_to_string(&schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))
}

fn validate_against_schema(config_value: &Value, schema: &Value) -> Result<()> {
    let compiled =
        JSONSchema::compile(schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
