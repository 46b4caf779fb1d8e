//! Tests against the default pretrained model
//!
//! These download `tabularisai/multilingual-sentiment-analysis` from the
//! Hugging Face Hub and only run with `SENTISTREAM_RUN_MODEL_TESTS=1`.

use sentistream_analyzer::{AnalyzerConfig, SentimentAnalyzer};
use sentistream_core::SentimentLabel;
use std::sync::OnceLock;

fn model_tests_enabled() -> bool {
    std::env::var("SENTISTREAM_RUN_MODEL_TESTS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn default_analyzer() -> Option<&'static SentimentAnalyzer> {
    if !model_tests_enabled() {
        return None;
    }

    static ANALYZER: OnceLock<SentimentAnalyzer> = OnceLock::new();
    Some(ANALYZER.get_or_init(|| {
        SentimentAnalyzer::load(&AnalyzerConfig::default())
            .expect("Failed to load default sentiment model")
    }))
}

#[test]
fn test_default_model_polarity() {
    let Some(analyzer) = default_analyzer() else {
        return;
    };

    let labels = analyzer
        .predict_labels(&[
            "I absolutely love this, it is the best thing ever!",
            "This is the worst experience I have ever had.",
        ])
        .unwrap();

    assert!(labels[0].is_positive(), "got {:?}", labels[0]);
    assert!(labels[1].is_negative(), "got {:?}", labels[1]);
}

#[test]
fn test_default_model_multilingual() {
    let Some(analyzer) = default_analyzer() else {
        return;
    };

    let scored = analyzer
        .predict_labels_with_scores(&[
            "Me encanta este producto, es increíble.",
            "Dieses Produkt ist schrecklich.",
            "この映画は素晴らしかった！",
        ])
        .unwrap();

    assert_eq!(scored.len(), 3);
    assert!(scored[0].label.is_positive(), "got {:?}", scored[0]);
    assert!(scored[1].label.is_negative(), "got {:?}", scored[1]);
    assert!(scored[2].label.is_positive(), "got {:?}", scored[2]);
    for result in &scored {
        assert!(result.score > 0.2 && result.score <= 1.0);
    }
}

#[test]
fn test_default_model_long_and_empty_inputs() {
    let Some(analyzer) = default_analyzer() else {
        return;
    };

    let long = "The service was fine. ".repeat(400);
    let results = analyzer
        .predict_labels_with_scores(&[long.as_str(), ""])
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn test_default_model_batch_matches_single() {
    let Some(analyzer) = default_analyzer() else {
        return;
    };

    let short = "Great stream today!";
    let long = "Honestly the audio kept cutting out and the chat was full of spam, \
                which made the whole thing hard to follow.";

    let alone = analyzer.predict_distributions(short).unwrap();
    let batched = analyzer.predict_distributions(&[short, long]).unwrap();

    assert_eq!(alone[0].label, batched[0].label);
    for (a, b) in alone[0].probabilities.iter().zip(&batched[0].probabilities) {
        assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
    }
    assert_ne!(batched[0].label, SentimentLabel::VeryNegative);
}
