//! In-memory tokenizer and keyword-counting classifier
//!
//! Lets the analyzer, processor and CLI be exercised without downloading a
//! model. The classifier scores each text by counting positive and negative
//! keywords among its unmasked tokens, so truncation and padding mistakes
//! show up as wrong labels.

use crate::analyzer::SentimentAnalyzer;
use crate::batch::BatchTensors;
use crate::classifier::SequenceClassifier;
use crate::config::AnalyzerConfig;
use candle_core::{Device, Tensor};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Words the keyword classifier counts as positive
pub const POSITIVE_WORDS: [&str; 5] = ["love", "best", "great", "good", "amazing"];

/// Words the keyword classifier counts as negative
pub const NEGATIVE_WORDS: [&str; 5] = ["terrible", "hate", "awful", "bad", "worst"];

const NEUTRAL_WORDS: [&str; 16] = [
    "i", "it", "is", "this", "the", "was", "stream", "today", "movie", "product", "service",
    "okay", "not", "very", "and", "chat",
];

/// Lowercasing, whitespace-splitting word-level tokenizer with BERT special tokens.
///
/// Ids: `[PAD]`=0, `[UNK]`=1, `[CLS]`=2, `[SEP]`=3, then the keyword vocabulary.
pub fn sample_tokenizer() -> Tokenizer {
    let specials = ["[PAD]", "[UNK]", "[CLS]", "[SEP]"];
    let words = specials
        .iter()
        .chain(POSITIVE_WORDS.iter())
        .chain(NEGATIVE_WORDS.iter())
        .chain(NEUTRAL_WORDS.iter());

    let vocab: serde_json::Map<String, serde_json::Value> = words
        .enumerate()
        .map(|(id, word)| (word.to_string(), serde_json::json!(id)))
        .collect();

    let added_tokens: Vec<serde_json::Value> = specials
        .iter()
        .enumerate()
        .map(|(id, token)| {
            serde_json::json!({
                "id": id,
                "content": token,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            })
        })
        .collect();

    let spec = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "BertProcessing",
            "sep": ["[SEP]", 3],
            "cls": ["[CLS]", 2]
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    });

    spec.to_string()
        .parse()
        .expect("sample tokenizer definition is valid")
}

/// Call statistics shared between a [`KeywordClassifier`] and the test holding it
#[derive(Debug, Default)]
pub struct ClassifierStats {
    calls: AtomicUsize,
    max_seq_len: AtomicUsize,
}

impl ClassifierStats {
    /// Number of forward passes
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Longest padded sequence seen in any forward pass
    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Score,
    Fail(String),
    NotANumber,
}

/// Classifier whose logits peak at `2 + (#positive - #negative)`, clamped to the label range
pub struct KeywordClassifier {
    positive: HashSet<u32>,
    negative: HashSet<u32>,
    num_labels: usize,
    output_width: usize,
    behavior: Behavior,
    stats: Arc<ClassifierStats>,
}

impl KeywordClassifier {
    /// Keyword ids are looked up in `tokenizer`
    pub fn new(tokenizer: &Tokenizer) -> Self {
        let ids = |words: &[&str]| -> HashSet<u32> {
            words.iter().filter_map(|w| tokenizer.token_to_id(w)).collect()
        };

        Self {
            positive: ids(&POSITIVE_WORDS),
            negative: ids(&NEGATIVE_WORDS),
            num_labels: 5,
            output_width: 5,
            behavior: Behavior::Score,
            stats: Arc::new(ClassifierStats::default()),
        }
    }

    /// Declare and emit `n` classes
    pub fn with_num_labels(mut self, n: usize) -> Self {
        self.num_labels = n;
        self.output_width = n;
        self
    }

    /// Keep the declared class count but emit rows of width `n`
    pub fn with_output_width(mut self, n: usize) -> Self {
        self.output_width = n;
        self
    }

    /// Fail every forward pass with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Fail(message.into());
        self
    }

    /// Emit NaN logits
    pub fn producing_nan(mut self) -> Self {
        self.behavior = Behavior::NotANumber;
        self
    }

    /// Handle to the call statistics
    pub fn stats(&self) -> Arc<ClassifierStats> {
        Arc::clone(&self.stats)
    }

    fn score(&self, ids: &[u32], mask: &[u32]) -> i64 {
        ids.iter()
            .zip(mask)
            .filter(|(_, &m)| m == 1)
            .map(|(id, _)| {
                if self.positive.contains(id) {
                    1
                } else if self.negative.contains(id) {
                    -1
                } else {
                    0
                }
            })
            .sum()
    }
}

impl SequenceClassifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn forward(&self, batch: &BatchTensors) -> candle_core::Result<Tensor> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.stats
            .max_seq_len
            .fetch_max(batch.seq_len(), Ordering::SeqCst);

        if let Behavior::Fail(message) = &self.behavior {
            return Err(candle_core::Error::Msg(message.clone()));
        }

        let ids: Vec<Vec<u32>> = batch.input_ids.to_vec2()?;
        let mask: Vec<Vec<u32>> = batch.attention_mask.to_vec2()?;
        let width = self.output_width;
        let top = width.saturating_sub(1) as i64;

        let mut logits = Vec::with_capacity(ids.len() * width);
        for (row_ids, row_mask) in ids.iter().zip(&mask) {
            let center = (2 + self.score(row_ids, row_mask).clamp(-2, 2)).min(top);
            for class in 0..width as i64 {
                let logit = match self.behavior {
                    Behavior::NotANumber => f32::NAN,
                    _ => -((class - center).pow(2) as f32),
                };
                logits.push(logit);
            }
        }

        Tensor::from_vec(logits, (ids.len(), width), batch.input_ids.device())
    }
}

/// Analyzer over [`sample_tokenizer`] and a default [`KeywordClassifier`]
pub fn sample_analyzer(config: &AnalyzerConfig) -> SentimentAnalyzer {
    let tokenizer = sample_tokenizer();
    let classifier = KeywordClassifier::new(&tokenizer);
    sample_analyzer_with(config, classifier).expect("sample analyzer builds")
}

/// Analyzer over [`sample_tokenizer`] and the given classifier
pub fn sample_analyzer_with(
    config: &AnalyzerConfig,
    classifier: KeywordClassifier,
) -> sentistream_core::Result<SentimentAnalyzer> {
    SentimentAnalyzer::from_parts(sample_tokenizer(), Box::new(classifier), config, Device::Cpu)
}
