//! Sentistream Analyzer
//!
//! Batched five-class sentiment inference over pretrained transformer
//! sequence classifiers, run with Candle.
//!
//! A [`SentimentAnalyzer`] owns a tokenizer, a model and a [`LabelMap`].
//! Each prediction call tokenizes the whole batch (right-truncated to
//! `max_length`, right-padded to the longest row), runs one forward pass,
//! applies softmax and maps each row's argmax to a [`SentimentLabel`].
//!
//! ```no_run
//! use sentistream_analyzer::{AnalyzerConfig, SentimentAnalyzer};
//!
//! let analyzer = SentimentAnalyzer::load(&AnalyzerConfig::default())?;
//! let labels = analyzer.predict_labels(&["I love this!", "Terrible service."])?;
//! # Ok::<(), sentistream_core::Error>(())
//! ```
//!
//! [`SentimentLabel`]: sentistream_core::SentimentLabel

pub mod analyzer;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod labels;
pub mod model_loader;
pub mod postprocess;
pub mod processor;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use analyzer::{SentimentAnalyzer, SharedAnalyzer, TextBatch};
pub use batch::{BatchEncoder, BatchTensors, EncodedBatch};
pub use classifier::{load_classifier, SequenceClassifier};
pub use config::{AnalyzerConfig, DeviceSpec, DEFAULT_MODEL_NAME, ENV_PREFIX};
pub use labels::{LabelMap, NUM_CLASSES};
pub use model_loader::{Architecture, ModelFiles, ModelManifest, ModelSource};
pub use processor::CommentProcessor;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::analyzer::{SentimentAnalyzer, SharedAnalyzer};
    pub use crate::config::AnalyzerConfig;
    pub use crate::labels::LabelMap;
    pub use crate::processor::CommentProcessor;
    pub use sentistream_core::prelude::*;
}
