//! Comment stream processing
//!
//! Enriches chat comment records with their sentiment. Records without
//! usable text are passed through unlabeled; the rest are analyzed in
//! fixed-size batches.

use crate::analyzer::SharedAnalyzer;
use crate::config::AnalyzerConfig;
use sentistream_core::{AnalyzedComment, CommentRecord, Result, ScoredSentiment, SentimentLabel};
use tracing::{debug, warn};

/// Batches comment records through a shared analyzer
#[derive(Debug, Clone)]
pub struct CommentProcessor {
    analyzer: SharedAnalyzer,
    batch_size: usize,
}

impl CommentProcessor {
    /// Create a processor; a zero batch size is treated as 1
    pub fn new(analyzer: SharedAnalyzer, batch_size: usize) -> Self {
        Self {
            analyzer,
            batch_size: batch_size.max(1),
        }
    }

    /// Create a processor using the configured batch size
    pub fn from_config(analyzer: SharedAnalyzer, config: &AnalyzerConfig) -> Self {
        Self::new(analyzer, config.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn analyzer(&self) -> &SharedAnalyzer {
        &self.analyzer
    }

    /// Analyze every record with text; output keeps input order and length
    pub fn process(&self, records: Vec<CommentRecord>) -> Result<Vec<AnalyzedComment>> {
        let mut predictions: Vec<Option<ScoredSentiment>> = vec![None; records.len()];

        let pending: Vec<(usize, &str)> = records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| match record.text() {
                Some(text) => Some((index, text)),
                None => {
                    warn!(
                        index,
                        user_id = record.user_id.as_deref().unwrap_or("-"),
                        "skipping comment without text"
                    );
                    metrics::counter!("sentistream_comments_skipped_total").increment(1);
                    None
                }
            })
            .collect();

        for chunk in pending.chunks(self.batch_size) {
            let texts: Vec<&str> = chunk.iter().map(|(_, text)| *text).collect();
            let scored = self.analyzer.predict_labels_with_scores(&texts)?;
            for ((index, _), prediction) in chunk.iter().zip(scored) {
                predictions[*index] = Some(prediction);
            }
        }

        debug!(
            total = records.len(),
            analyzed = predictions.iter().filter(|p| p.is_some()).count(),
            "comment batch processed"
        );

        Ok(records
            .into_iter()
            .zip(predictions)
            .map(|(record, prediction)| AnalyzedComment::new(record, prediction))
            .collect())
    }

    /// Sentiment of one record, `None` when it has no text
    pub fn process_one(&self, record: &CommentRecord) -> Result<Option<SentimentLabel>> {
        let Some(text) = record.text() else {
            metrics::counter!("sentistream_comments_skipped_total").increment(1);
            return Ok(None);
        };

        Ok(self.analyzer.predict_labels(text)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_analyzer, sample_analyzer_with, sample_tokenizer, KeywordClassifier};
    use std::sync::Arc;

    fn processor(batch_size: usize) -> CommentProcessor {
        let analyzer = sample_analyzer(&AnalyzerConfig::default());
        CommentProcessor::new(Arc::new(analyzer), batch_size)
    }

    #[test]
    fn test_skips_blank_comments_in_place() {
        let records = vec![
            CommentRecord::new("great stream").with_user("a"),
            CommentRecord::new("   ").with_user("b"),
            CommentRecord::default().with_user("c"),
            CommentRecord::new("worst stream").with_user("d"),
        ];

        let analyzed = processor(8).process(records).unwrap();
        assert_eq!(analyzed.len(), 4);
        assert_eq!(analyzed[0].sentiment, Some(SentimentLabel::Positive));
        assert!(analyzed[1].is_skipped());
        assert!(analyzed[2].is_skipped());
        assert_eq!(analyzed[3].sentiment, Some(SentimentLabel::Negative));
        assert_eq!(analyzed[3].record.user_id.as_deref(), Some("d"));
    }

    #[test]
    fn test_batches_by_batch_size() {
        let tokenizer = sample_tokenizer();
        let classifier = KeywordClassifier::new(&tokenizer);
        let stats = classifier.stats();
        let analyzer = sample_analyzer_with(&AnalyzerConfig::default(), classifier).unwrap();
        let processor = CommentProcessor::new(Arc::new(analyzer), 4);

        let records: Vec<CommentRecord> = (0..10)
            .map(|i| CommentRecord::new(if i % 2 == 0 { "good" } else { "bad" }))
            .collect();
        let analyzed = processor.process(records).unwrap();

        assert_eq!(stats.calls(), 3);
        for (i, comment) in analyzed.iter().enumerate() {
            let expected = if i % 2 == 0 {
                SentimentLabel::Positive
            } else {
                SentimentLabel::Negative
            };
            assert_eq!(comment.sentiment, Some(expected));
            assert!(comment.confidence.unwrap() > 0.2);
        }
    }

    #[test]
    fn test_process_one() {
        let processor = processor(1);
        assert_eq!(
            processor.process_one(&CommentRecord::new("love it")).unwrap(),
            Some(SentimentLabel::Positive)
        );
        assert_eq!(processor.process_one(&CommentRecord::new("")).unwrap(), None);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        assert_eq!(processor(0).batch_size(), 1);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let tokenizer = sample_tokenizer();
        let classifier = KeywordClassifier::new(&tokenizer).failing("device lost");
        let analyzer = sample_analyzer_with(&AnalyzerConfig::default(), classifier).unwrap();
        let processor = CommentProcessor::new(Arc::new(analyzer), 2);

        let err = processor
            .process(vec![CommentRecord::new("good")])
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("device lost"));
    }
}
