//! Configuration for the analyzer and model loading
//!
//! [`AnalyzerConfig`] is an immutable value handed to the analyzer's
//! constructor. Layering (defaults, YAML file, `SENTIMENT_*` environment
//! variables) happens here, never inside the analyzer.

use crate::labels::LabelMap;
use candle_core::Device;
use sentistream_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Model used when none is configured
pub const DEFAULT_MODEL_NAME: &str = "tabularisai/multilingual-sentiment-analysis";

/// Prefix of environment variables that override file configuration
pub const ENV_PREFIX: &str = "SENTIMENT";

const MIN_MAX_LENGTH: usize = 8;
const MAX_MAX_LENGTH: usize = 8192;

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Hugging Face repository id, or a local directory holding the model files
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Hub revision (branch, tag or commit)
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Maximum tokens per text, special tokens included
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Class index to label table
    #[serde(default)]
    pub label_map: LabelMap,

    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceSpec,

    /// Texts per forward pass when processing comment streams
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Hub cache directory; the hf-hub default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

fn default_model_name() -> String {
    DEFAULT_MODEL_NAME.to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_max_length() -> usize {
    512
}

fn default_batch_size() -> usize {
    32
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            revision: default_revision(),
            max_length: default_max_length(),
            label_map: LabelMap::default(),
            device: DeviceSpec::default(),
            batch_size: default_batch_size(),
            cache_dir: None,
        }
    }
}

impl AnalyzerConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid analyzer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::config(format!(
                "failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Layered load: defaults, then the YAML file, then `SENTIMENT_*` variables.
    ///
    /// An explicit `path` must exist. Without one, [`Self::default_path`] is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| Error::config(format!("failed to build defaults: {}", e)))?;

        let mut builder = config::Config::builder().add_source(defaults);

        match path {
            Some(path) => {
                builder = builder.add_source(
                    config::File::from(path)
                        .format(config::FileFormat::Yaml)
                        .required(true),
                );
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(
                        config::File::from(default_path)
                            .format(config::FileFormat::Yaml)
                            .required(false),
                    );
                }
            }
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(format!("failed to load configuration: {}", e)))?;

        config.validate()?;
        tracing::debug!(model = %config.model_name, max_length = config.max_length, "configuration loaded");
        Ok(config)
    }

    /// `~/.config/sentistream/config.yaml` (platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sentistream").join("config.yaml"))
    }

    /// Check value ranges and the label map
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(Error::config("model_name must not be empty"));
        }

        if !(MIN_MAX_LENGTH..=MAX_MAX_LENGTH).contains(&self.max_length) {
            return Err(Error::config(format!(
                "max_length must be between {} and {}, got {}",
                MIN_MAX_LENGTH, MAX_MAX_LENGTH, self.max_length
            )));
        }

        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }

        self.label_map.validate()
    }

    /// Set the model identifier
    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Set the hub revision
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Set the maximum token length
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the label map
    pub fn with_label_map(mut self, label_map: LabelMap) -> Self {
        self.label_map = label_map;
        self
    }

    /// Set the device
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    /// Set the processing batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the hub cache directory
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::config(format!("failed to render config: {}", e)))
    }
}

/// Device specification, written as `cpu`, `cuda`, `cuda:1`, `metal` or `metal:0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl DeviceSpec {
    /// Create the candle device
    pub fn to_device(self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(index) => Device::new_cuda(index).map_err(|e| {
                Error::model_load(format!("failed to initialize CUDA device {}: {}", index, e))
            }),
            Self::Metal(index) => Device::new_metal(index).map_err(|e| {
                Error::model_load(format!("failed to initialize Metal device {}: {}", index, e))
            }),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let (kind, index) = match lower.split_once(':') {
            Some((kind, index)) => {
                let index = index.parse::<usize>().map_err(|_| {
                    Error::config(format!("invalid device index in '{}'", s))
                })?;
                (kind.to_string(), index)
            }
            None => (lower, 0),
        };

        match kind.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(index)),
            "metal" | "mps" => Ok(Self::Metal(index)),
            _ => Err(Error::config(format!(
                "unknown device '{}' (expected cpu, cuda[:N] or metal[:N])",
                s
            ))),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(spec: DeviceSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(index) => write!(f, "cuda:{}", index),
            Self::Metal(index) => write!(f, "metal:{}", index),
        }
    }
}
