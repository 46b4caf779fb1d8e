//! Model artifact resolution
//!
//! Locates the three artifacts a sentiment model needs (`config.json`,
//! `model.safetensors` and a tokenizer) either in a local directory or in a
//! Hugging Face Hub repository, downloading into the hub cache on first use.

use crate::config::AnalyzerConfig;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use sentistream_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{Model, Tokenizer};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const TOKENIZER_FILE: &str = "tokenizer.json";
const VOCAB_FILE: &str = "vocab.txt";

/// Where model artifacts come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Directory on disk containing the artifacts
    Local(PathBuf),

    /// Hugging Face Hub repository
    Hub { repo: String, revision: String },
}

impl ModelSource {
    /// An existing directory is used as-is; anything else is a hub repository id.
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        let path = Path::new(&config.model_name);
        if path.is_dir() {
            Self::Local(path.to_path_buf())
        } else {
            Self::Hub {
                repo: config.model_name.clone(),
                revision: config.revision.clone(),
            }
        }
    }
}

/// Tokenizer artifact found for a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerFile {
    /// Serialized `tokenizers` pipeline
    Json(PathBuf),

    /// WordPiece vocabulary, used when no `tokenizer.json` is published
    Vocab(PathBuf),
}

/// Resolved paths of all model artifacts
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
    pub tokenizer: TokenizerFile,
}

impl ModelFiles {
    /// Resolve artifacts, downloading from the hub when needed
    pub fn resolve(source: &ModelSource, cache_dir: Option<&Path>) -> Result<Self> {
        match source {
            ModelSource::Local(dir) => Self::from_dir(dir),
            ModelSource::Hub { repo, revision } => Self::download(repo, revision, cache_dir),
        }
    }

    /// Use artifacts from a local directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let config = dir.join(CONFIG_FILE);
        if !config.is_file() {
            return Err(Error::model_load(format!(
                "{} not found in {}",
                CONFIG_FILE,
                dir.display()
            )));
        }

        let weights = dir.join(WEIGHTS_FILE);
        if !weights.is_file() {
            return Err(Error::model_load(format!(
                "{} not found in {}",
                WEIGHTS_FILE,
                dir.display()
            )));
        }

        let tokenizer_json = dir.join(TOKENIZER_FILE);
        let vocab = dir.join(VOCAB_FILE);
        let tokenizer = if tokenizer_json.is_file() {
            TokenizerFile::Json(tokenizer_json)
        } else if vocab.is_file() {
            TokenizerFile::Vocab(vocab)
        } else {
            return Err(Error::model_load(format!(
                "no tokenizer found in {} (tried {}, {})",
                dir.display(),
                TOKENIZER_FILE,
                VOCAB_FILE
            )));
        };

        debug!(path = %dir.display(), "using local model directory");
        Ok(Self {
            config,
            weights,
            tokenizer,
        })
    }

    fn download(repo: &str, revision: &str, cache_dir: Option<&Path>) -> Result<Self> {
        info!(repo, revision, "fetching model from Hugging Face Hub");

        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(dir) = cache_dir {
            builder = builder.with_cache_dir(dir.to_path_buf());
        }
        let api = builder.build().map_err(|e| {
            Error::model_load(format!("failed to initialize Hugging Face API: {}", e))
        })?;

        let repo_api = api.repo(Repo::with_revision(
            repo.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let fetch = |file: &str| {
            repo_api.get(file).map_err(|e| {
                Error::model_load(format!("failed to fetch {} from '{}': {}", file, repo, e))
            })
        };

        let config = fetch(CONFIG_FILE)?;
        let weights = fetch(WEIGHTS_FILE)?;
        let tokenizer = match fetch(TOKENIZER_FILE) {
            Ok(path) => TokenizerFile::Json(path),
            Err(json_err) => {
                debug!(error = %json_err, "tokenizer.json unavailable, trying vocab.txt");
                TokenizerFile::Vocab(fetch(VOCAB_FILE).map_err(|_| {
                    Error::model_load(format!(
                        "no tokenizer found in '{}' (tried {}, {})",
                        repo, TOKENIZER_FILE, VOCAB_FILE
                    ))
                })?)
            }
        };

        Ok(Self {
            config,
            weights,
            tokenizer,
        })
    }
}

/// Model families with a supported sequence-classification head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    DistilBert,
    Bert,
    XlmRoberta,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DistilBert => "distilbert",
            Self::Bert => "bert",
            Self::XlmRoberta => "xlm-roberta",
        }
    }
}

/// The subset of `config.json` needed to pick and size a classifier
#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    pub model_type: String,

    #[serde(default)]
    pub architectures: Vec<String>,

    #[serde(default)]
    pub id2label: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub num_labels: Option<usize>,

    /// Hidden size under its DistilBERT name
    #[serde(default)]
    pub dim: Option<usize>,

    #[serde(default)]
    pub hidden_size: Option<usize>,

    #[serde(default)]
    pub max_position_embeddings: Option<usize>,

    #[serde(default)]
    pub pad_token_id: Option<u32>,
}

impl ModelManifest {
    /// Parse a `config.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        parse_json_config(path)
    }

    /// Classifier family from `model_type`
    pub fn architecture(&self) -> Result<Architecture> {
        match self.model_type.to_ascii_lowercase().as_str() {
            "distilbert" => Ok(Architecture::DistilBert),
            "bert" => Ok(Architecture::Bert),
            "xlm-roberta" | "roberta" => Ok(Architecture::XlmRoberta),
            other => Err(Error::model_load(format!(
                "unsupported model type '{}' (expected distilbert, bert or xlm-roberta)",
                other
            ))),
        }
    }

    /// Number of output classes the head was trained with
    pub fn num_classes(&self) -> usize {
        self.id2label
            .as_ref()
            .map(BTreeMap::len)
            .filter(|n| *n > 0)
            .or(self.num_labels)
            .unwrap_or(2)
    }

    /// Whether the checkpoint was exported with a sequence classification head
    pub fn has_classification_head(&self) -> bool {
        self.architectures
            .iter()
            .any(|name| name.ends_with("ForSequenceClassification"))
    }

    /// Width of the encoder's hidden states
    pub fn hidden_size(&self) -> Result<usize> {
        self.dim
            .or(self.hidden_size)
            .ok_or_else(|| Error::model_load("config.json has neither 'dim' nor 'hidden_size'"))
    }

    /// Model's published class names in index order
    pub fn class_names(&self) -> Vec<String> {
        let Some(id2label) = &self.id2label else {
            return Vec::new();
        };
        let mut entries: Vec<(usize, &String)> = id2label
            .iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|idx| (idx, v)))
            .collect();
        entries.sort_by_key(|(idx, _)| *idx);
        entries.into_iter().map(|(_, v)| v.clone()).collect()
    }
}

/// Load the tokenizer for resolved model files
pub fn load_tokenizer(files: &ModelFiles) -> Result<Tokenizer> {
    match &files.tokenizer {
        TokenizerFile::Json(path) => {
            debug!("loading tokenizer from {}", path.display());
            Tokenizer::from_file(path).map_err(|e| {
                Error::model_load(format!("failed to load {}: {}", path.display(), e))
            })
        }
        TokenizerFile::Vocab(path) => {
            debug!("building WordPiece tokenizer from {}", path.display());
            wordpiece_tokenizer(path)
        }
    }
}

fn wordpiece_tokenizer(vocab_path: &Path) -> Result<Tokenizer> {
    let wordpiece = WordPiece::from_file(vocab_path.to_string_lossy().as_ref())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| Error::model_load(format!("failed to build WordPiece model: {}", e)))?;

    let special_id = |token: &str| {
        wordpiece.token_to_id(token).ok_or_else(|| {
            Error::model_load(format!("vocabulary has no {} token", token))
        })
    };
    let cls = ("[CLS]".to_string(), special_id("[CLS]")?);
    let sep = ("[SEP]".to_string(), special_id("[SEP]")?);

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::default()));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    tokenizer.with_post_processor(Some(BertProcessing::new(sep, cls)));
    Ok(tokenizer)
}

/// Memory-map safetensors weights as f32
pub fn load_var_builder(weights: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    // SAFETY: the weights file is not modified while mapped
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights.to_path_buf()], DType::F32, device)
            .map_err(|e| Error::model_load(format!("failed to load weights: {}", e)))?
    };
    Ok(vb)
}

/// Read and deserialize a JSON file
pub fn parse_json_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::model_load(format!("failed to read {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        Error::model_load(format!("failed to parse {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DISTILBERT_CONFIG: &str = r#"{
        "model_type": "distilbert",
        "architectures": ["DistilBertForSequenceClassification"],
        "dim": 768,
        "max_position_embeddings": 512,
        "pad_token_id": 0,
        "id2label": {"0": "Very Negative", "1": "Negative", "2": "Neutral", "3": "Positive", "4": "Very Positive"}
    }"#;

    #[test]
    fn test_manifest_parsing() {
        let manifest: ModelManifest = serde_json::from_str(DISTILBERT_CONFIG).unwrap();
        assert_eq!(manifest.architecture().unwrap(), Architecture::DistilBert);
        assert_eq!(manifest.num_classes(), 5);
        assert_eq!(manifest.hidden_size().unwrap(), 768);
        assert_eq!(manifest.class_names()[4], "Very Positive");
        assert!(manifest.has_classification_head());
    }

    #[test]
    fn test_manifest_num_labels_fallback() {
        let manifest: ModelManifest =
            serde_json::from_str(r#"{"model_type": "bert", "hidden_size": 312, "num_labels": 3}"#)
                .unwrap();
        assert_eq!(manifest.architecture().unwrap(), Architecture::Bert);
        assert_eq!(manifest.num_classes(), 3);
        assert!(manifest.class_names().is_empty());

        let bare: ModelManifest = serde_json::from_str(r#"{"model_type": "roberta"}"#).unwrap();
        assert_eq!(bare.architecture().unwrap(), Architecture::XlmRoberta);
        assert_eq!(bare.num_classes(), 2);
        assert!(bare.hidden_size().is_err());
        assert!(!bare.has_classification_head());

        let encoder: ModelManifest =
            serde_json::from_str(r#"{"model_type": "bert", "architectures": ["BertModel"]}"#)
                .unwrap();
        assert!(!encoder.has_classification_head());
    }

    #[test]
    fn test_unsupported_architecture() {
        let manifest: ModelManifest = serde_json::from_str(r#"{"model_type": "gpt2"}"#).unwrap();
        assert!(matches!(manifest.architecture(), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn test_local_source_detection() {
        let dir = TempDir::new().unwrap();
        let config = AnalyzerConfig::default().with_model(dir.path().to_string_lossy());
        assert_eq!(
            ModelSource::from_config(&config),
            ModelSource::Local(dir.path().to_path_buf())
        );

        let hub = ModelSource::from_config(&AnalyzerConfig::default());
        assert!(matches!(hub, ModelSource::Hub { ref revision, .. } if revision == "main"));
    }

    #[test]
    fn test_local_dir_requires_artifacts() {
        let dir = TempDir::new().unwrap();
        let err = ModelFiles::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("config.json"), "{}", err);

        fs::write(dir.path().join(CONFIG_FILE), DISTILBERT_CONFIG).unwrap();
        let err = ModelFiles::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("model.safetensors"), "{}", err);

        fs::write(dir.path().join(WEIGHTS_FILE), b"").unwrap();
        let err = ModelFiles::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no tokenizer"), "{}", err);

        fs::write(dir.path().join(VOCAB_FILE), "[PAD]\n[UNK]\n[CLS]\n[SEP]\nhello\n").unwrap();
        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert!(matches!(files.tokenizer, TokenizerFile::Vocab(_)));
    }

    #[test]
    fn test_vocab_fallback_tokenizer() {
        let dir = TempDir::new().unwrap();
        let vocab = dir.path().join(VOCAB_FILE);
        fs::write(&vocab, "[PAD]\n[UNK]\n[CLS]\n[SEP]\nhello\nworld\n").unwrap();

        let files = ModelFiles {
            config: dir.path().join(CONFIG_FILE),
            weights: dir.path().join(WEIGHTS_FILE),
            tokenizer: TokenizerFile::Vocab(vocab),
        };
        let tokenizer = load_tokenizer(&files).unwrap();
        let encoding = tokenizer.encode("Hello world", true).unwrap();
        assert_eq!(encoding.get_ids(), &[2, 4, 5, 3]);
    }

    #[test]
    fn test_missing_weights_is_model_load_error() {
        let dir = TempDir::new().unwrap();
        let err = load_var_builder(&dir.path().join(WEIGHTS_FILE), &Device::Cpu).err().expect("expected load error");
        assert!(matches!(err, Error::ModelLoad(_)));
    }
}
