//! The sentiment analyzer: batch tokenization, one forward pass, softmax,
//! argmax and label mapping.

use crate::batch::BatchEncoder;
use crate::classifier::{load_classifier, SequenceClassifier};
use crate::config::AnalyzerConfig;
use crate::labels::LabelMap;
use crate::model_loader::{load_tokenizer, ModelFiles, ModelManifest, ModelSource};
use crate::postprocess::{argmax, check_distribution, softmax_rows};
use candle_core::{Device, Tensor};
use sentistream_core::{ClassDistribution, Error, Result, ScoredSentiment, SentimentLabel};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

/// Analyzer shared across threads; inference only needs `&self`
pub type SharedAnalyzer = Arc<SentimentAnalyzer>;

/// Input accepted by the prediction methods: one text or a batch of texts
pub trait TextBatch {
    /// Texts in order
    fn texts(&self) -> Vec<&str>;
}

impl TextBatch for str {
    fn texts(&self) -> Vec<&str> {
        vec![self]
    }
}

impl TextBatch for String {
    fn texts(&self) -> Vec<&str> {
        vec![self.as_str()]
    }
}

impl<S: AsRef<str>> TextBatch for [S] {
    fn texts(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<S: AsRef<str>, const N: usize> TextBatch for [S; N] {
    fn texts(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<S: AsRef<str>> TextBatch for Vec<S> {
    fn texts(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

/// Five-class sentiment analyzer over a pretrained sequence classifier.
///
/// Holds the tokenizer, the model and the label map for its whole lifetime.
/// Every call encodes the batch with right-truncation and longest-row padding,
/// runs one forward pass and maps each row's argmax through the label map.
/// Results are returned in input order.
pub struct SentimentAnalyzer {
    model_name: String,
    encoder: BatchEncoder,
    model: Box<dyn SequenceClassifier>,
    labels: LabelMap,
    device: Device,
}

impl SentimentAnalyzer {
    /// Resolve, download if needed, and load the configured model
    pub fn load(config: &AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        let start = Instant::now();

        let device = config.device.to_device()?;
        let source = ModelSource::from_config(config);
        let files = ModelFiles::resolve(&source, config.cache_dir.as_deref())?;
        let manifest = ModelManifest::from_file(&files.config)?;

        let names = manifest.class_names();
        if !names.is_empty() {
            debug!(classes = ?names, "model class names");
        }

        let tokenizer = load_tokenizer(&files)?;
        let model = load_classifier(&files, &manifest, &device)?;
        let analyzer = Self::from_parts(tokenizer, model, config, device)?;

        let elapsed = start.elapsed();
        metrics::histogram!("sentistream_model_load_seconds").record(elapsed.as_secs_f64());
        info!(
            model = %analyzer.model_name,
            architecture = analyzer.model.name(),
            max_length = analyzer.max_length(),
            elapsed_ms = elapsed.as_millis() as u64,
            "sentiment model loaded"
        );

        Ok(analyzer)
    }

    /// Assemble from an already-loaded tokenizer and model
    pub fn from_parts(
        tokenizer: Tokenizer,
        model: Box<dyn SequenceClassifier>,
        config: &AnalyzerConfig,
        device: Device,
    ) -> Result<Self> {
        config.validate()?;

        if model.num_labels() != config.label_map.len() {
            return Err(Error::label_map(format!(
                "model '{}' has {} output classes but the label map has {} entries",
                config.model_name,
                model.num_labels(),
                config.label_map.len()
            )));
        }

        let max_length = match model.max_positions() {
            Some(limit) if limit < config.max_length => {
                warn!(
                    configured = config.max_length,
                    limit, "max_length exceeds model positions, capping"
                );
                limit
            }
            _ => config.max_length,
        };

        let encoder = BatchEncoder::new(tokenizer, max_length)?;

        Ok(Self {
            model_name: config.model_name.clone(),
            encoder,
            model,
            labels: config.label_map.clone(),
            device,
        })
    }

    /// Configured model identifier
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Effective token cap per text, special tokens included
    pub fn max_length(&self) -> usize {
        self.encoder.max_length()
    }

    /// Index-to-label table applied to each argmax
    pub fn label_map(&self) -> &LabelMap {
        &self.labels
    }

    /// Device the model runs on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Predicted label per text, in input order
    pub fn predict_labels<T: TextBatch + ?Sized>(&self, texts: &T) -> Result<Vec<SentimentLabel>> {
        Ok(self
            .predict_distributions(texts)?
            .into_iter()
            .map(|d| d.label)
            .collect())
    }

    /// Predicted label and its probability per text, in input order
    pub fn predict_labels_with_scores<T: TextBatch + ?Sized>(
        &self,
        texts: &T,
    ) -> Result<Vec<ScoredSentiment>> {
        Ok(self
            .predict_distributions(texts)?
            .iter()
            .map(ClassDistribution::scored)
            .collect())
    }

    /// Predicted label with the full class distribution per text
    pub fn predict_distributions<T: TextBatch + ?Sized>(
        &self,
        texts: &T,
    ) -> Result<Vec<ClassDistribution>> {
        let texts = texts.texts();
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let result = self.run(&texts);

        match &result {
            Ok(_) => {
                metrics::counter!("sentistream_batches_total").increment(1);
                metrics::counter!("sentistream_texts_analyzed_total").increment(texts.len() as u64);
                metrics::histogram!("sentistream_batch_size").record(texts.len() as f64);
                metrics::histogram!("sentistream_inference_latency_us")
                    .record(start.elapsed().as_micros() as f64);
            }
            Err(e) => {
                metrics::counter!("sentistream_errors_total", "kind" => e.kind()).increment(1);
            }
        }

        result
    }

    fn run(&self, texts: &[&str]) -> Result<Vec<ClassDistribution>> {
        let encoded = self.encoder.encode(texts)?;
        let tensors = encoded.to_tensors(&self.device)?;

        debug!(
            batch_size = encoded.batch_size,
            seq_len = encoded.seq_len,
            "running forward pass"
        );

        let logits = self
            .model
            .forward(&tensors)
            .map_err(|e| Error::inference(format!("forward pass failed: {}", e)))?;
        self.check_logits(&logits, texts.len())?;

        softmax_rows(&logits)?
            .into_iter()
            .map(|probabilities| {
                check_distribution(&probabilities)?;
                let (index, score) = argmax(&probabilities)
                    .ok_or_else(|| Error::inference("empty probability row"))?;
                Ok(ClassDistribution {
                    label: self.labels.label(index)?,
                    score,
                    probabilities,
                })
            })
            .collect()
    }

    fn check_logits(&self, logits: &Tensor, batch_size: usize) -> Result<()> {
        let (rows, classes) = logits.dims2().map_err(|e| {
            Error::inference(format!(
                "expected logits shaped (batch, classes), got {:?}: {}",
                logits.dims(),
                e
            ))
        })?;

        if rows != batch_size {
            return Err(Error::inference(format!(
                "model returned {} rows for {} texts",
                rows, batch_size
            )));
        }

        if classes != self.labels.len() {
            return Err(Error::label_map(format!(
                "model produced {} classes but the label map has {} entries",
                classes,
                self.labels.len()
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for SentimentAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentAnalyzer")
            .field("model_name", &self.model_name)
            .field("architecture", &self.model.name())
            .field("max_length", &self.encoder.max_length())
            .field("labels", &self.labels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_analyzer, sample_analyzer_with, sample_tokenizer, KeywordClassifier};

    #[test]
    fn test_single_text_and_batch_inputs() {
        let analyzer = sample_analyzer(&AnalyzerConfig::default());

        let single = analyzer.predict_labels("I love this").unwrap();
        assert_eq!(single, vec![SentimentLabel::Positive]);

        let owned = String::from("I hate this");
        assert_eq!(
            analyzer.predict_labels(&owned).unwrap(),
            vec![SentimentLabel::Negative]
        );

        let batch = analyzer
            .predict_labels(&["love amazing", "worst awful", "okay"])
            .unwrap();
        assert_eq!(
            batch,
            vec![
                SentimentLabel::VeryPositive,
                SentimentLabel::VeryNegative,
                SentimentLabel::Neutral
            ]
        );
    }

    #[test]
    fn test_empty_batch_skips_model() {
        let tokenizer = sample_tokenizer();
        let classifier = KeywordClassifier::new(&tokenizer);
        let stats = classifier.stats();
        let analyzer = sample_analyzer_with(&AnalyzerConfig::default(), classifier).unwrap();

        let empty: Vec<String> = Vec::new();
        assert!(analyzer.predict_labels(&empty).unwrap().is_empty());
        assert!(analyzer.predict_labels_with_scores(&empty).unwrap().is_empty());
        assert_eq!(stats.calls(), 0);
    }

    #[test]
    fn test_one_forward_pass_per_call() {
        let tokenizer = sample_tokenizer();
        let classifier = KeywordClassifier::new(&tokenizer);
        let stats = classifier.stats();
        let analyzer = sample_analyzer_with(&AnalyzerConfig::default(), classifier).unwrap();

        analyzer
            .predict_labels(&vec!["good"; 10])
            .unwrap();
        assert_eq!(stats.calls(), 1);
        assert_eq!(stats.max_seq_len(), 3);
    }

    #[test]
    fn test_mismatched_label_count_rejected_at_construction() {
        let tokenizer = sample_tokenizer();
        let classifier = KeywordClassifier::new(&tokenizer).with_num_labels(3);
        let err = sample_analyzer_with(&AnalyzerConfig::default(), classifier).unwrap_err();
        assert!(matches!(err, Error::LabelMap(_)), "{:?}", err);
    }

    #[test]
    fn test_max_positions_caps_max_length() {
        struct ShortModel(KeywordClassifier);

        impl SequenceClassifier for ShortModel {
            fn name(&self) -> &str {
                "short"
            }
            fn num_labels(&self) -> usize {
                self.0.num_labels()
            }
            fn max_positions(&self) -> Option<usize> {
                Some(16)
            }
            fn forward(&self, batch: &crate::batch::BatchTensors) -> candle_core::Result<Tensor> {
                self.0.forward(batch)
            }
        }

        let tokenizer = sample_tokenizer();
        let model = ShortModel(KeywordClassifier::new(&tokenizer));
        let analyzer = SentimentAnalyzer::from_parts(
            tokenizer,
            Box::new(model),
            &AnalyzerConfig::default(),
            Device::Cpu,
        )
        .unwrap();
        assert_eq!(analyzer.max_length(), 16);
    }
}
