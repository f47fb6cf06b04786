use std::path::{Path, PathBuf};
use std::time::Duration;

use embed_core::ElementType;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_LOCATION: &str = "model/model_O4.onnx";
pub const DEFAULT_VOCAB_LOCATION: &str = "model/tokenizer.json";
pub const DEFAULT_VOCAB_POINTER: &str = "/model/vocab";
pub const DEFAULT_UNKNOWN_TOKEN: &str = "[UNK]";
pub const DEFAULT_MAX_LENGTH: usize = 512;
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;
/// Used when the host cannot report its concurrency.
pub const FALLBACK_PARALLELISM: usize = 4;

const ENV_PREFIX: &str = "EMBED_WORKER";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load worker config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid worker config: {0}")]
    Invalid(String),
}

/// Everything the worker needs to know before `init`. Every field has a default, so an empty
/// config file (or none at all) yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub model_location: String,
    /// Local path, or an `http(s)://` URL.
    pub vocab_location: String,
    /// JSON pointer to the token -> id object inside the vocabulary document.
    pub vocab_pointer: String,
    pub unknown_token: String,
    pub max_length: usize,
    pub init_timeout_ms: u64,
    /// Degree of parallelism for pooling; `None` asks the host.
    pub parallelism: Option<usize>,
    pub execution_providers: Vec<String>,
    pub optimization_level: String,
    pub input_element_type: ElementType,
    /// Output tensor to pool; the first output when unset.
    pub output_name: Option<String>,
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            model_location: DEFAULT_MODEL_LOCATION.to_string(),
            vocab_location: DEFAULT_VOCAB_LOCATION.to_string(),
            vocab_pointer: DEFAULT_VOCAB_POINTER.to_string(),
            unknown_token: DEFAULT_UNKNOWN_TOKEN.to_string(),
            max_length: DEFAULT_MAX_LENGTH,
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            parallelism: None,
            execution_providers: vec!["cpu".to_string()],
            optimization_level: "all".to_string(),
            input_element_type: ElementType::Int64,
            output_name: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Load from the user config dir (`<config_dir>/embed-worker/config.toml`, optional) with
    /// `EMBED_WORKER__*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = dirs::config_dir().map(|d| d.join("embed-worker").join("config.toml"));
        Self::load_with(path.as_deref())
    }

    /// Load from an explicit file (optional if missing) with environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with(Some(path.as_ref()))
    }

    fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("execution_providers")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<WorkerConfig>()?;
        cfg.validate()?;
        tracing::debug!(target: "embed_config", ?cfg, "worker config loaded");
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_length == 0 {
            return Err(ConfigError::Invalid("max_length must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.input_element_type == ElementType::Float32 {
            return Err(ConfigError::Invalid(
                "input_element_type must be int64 or int32".into(),
            ));
        }
        if !self.vocab_pointer.is_empty() && !self.vocab_pointer.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "vocab_pointer must be a JSON pointer, got {:?}",
                self.vocab_pointer
            )));
        }
        Ok(())
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// Effective pooling parallelism: configured value, else host concurrency, never below 1.
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism
            .unwrap_or_else(|| match num_cpus::get() {
                0 => FALLBACK_PARALLELISM,
                n => n,
            })
            .max(1)
    }

    pub fn vocab_is_remote(&self) -> bool {
        self.vocab_location.starts_with("http://") || self.vocab_location.starts_with("https://")
    }

    pub fn vocab_path(&self) -> PathBuf {
        PathBuf::from(&self.vocab_location)
    }
}
