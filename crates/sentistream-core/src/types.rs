//! Core types for sentistream

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Five-point ordinal sentiment scale, ordered from most negative to most positive.
///
/// The discriminant is the class index the default label map assigns to each label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    #[serde(rename = "Very Negative")]
    VeryNegative = 0,
    #[serde(rename = "Negative")]
    Negative = 1,
    #[serde(rename = "Neutral")]
    Neutral = 2,
    #[serde(rename = "Positive")]
    Positive = 3,
    #[serde(rename = "Very Positive")]
    VeryPositive = 4,
}

impl SentimentLabel {
    /// All labels in class-index order
    pub const ALL: [SentimentLabel; 5] = [
        Self::VeryNegative,
        Self::Negative,
        Self::Neutral,
        Self::Positive,
        Self::VeryPositive,
    ];

    /// Human-readable name, as used in label maps and output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryNegative => "Very Negative",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
            Self::Positive => "Positive",
            Self::VeryPositive => "Very Positive",
        }
    }

    /// Default class index of this label
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Label at the given default class index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// True for `Negative` and `VeryNegative`
    pub fn is_negative(&self) -> bool {
        *self < Self::Neutral
    }

    /// True for `Positive` and `VeryPositive`
    pub fn is_positive(&self) -> bool {
        *self > Self::Neutral
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = crate::Error;

    /// Accepts "Very Negative", "very_negative", "VERY-NEGATIVE" and similar spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "verynegative" => Ok(Self::VeryNegative),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            "positive" => Ok(Self::Positive),
            "verypositive" => Ok(Self::VeryPositive),
            _ => Err(crate::Error::config(format!(
                "unknown sentiment label '{}'",
                s
            ))),
        }
    }
}

/// A predicted label with its confidence score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredSentiment {
    /// Predicted sentiment
    pub label: SentimentLabel,

    /// Maximum class probability (0.0-1.0); uncalibrated
    pub score: f32,
}

/// A prediction together with the full per-class probability distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDistribution {
    /// Predicted sentiment
    pub label: SentimentLabel,

    /// Probability of the predicted class
    pub score: f32,

    /// Softmax output, one entry per class index
    pub probabilities: Vec<f32>,
}

impl ClassDistribution {
    /// Drop the distribution, keeping label and score
    pub fn scored(&self) -> ScoredSentiment {
        ScoredSentiment {
            label: self.label,
            score: self.score,
        }
    }
}

/// A user comment as produced by the upstream chat ingestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    /// Author identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Comment text; missing or blank comments are not analyzed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Publication time as reported upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// Any other fields, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CommentRecord {
    /// Create a record holding only comment text
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Default::default()
        }
    }

    /// Set the author identifier
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Comment text if present and not blank
    pub fn text(&self) -> Option<&str> {
        self.comment.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// A comment record enriched with its sentiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedComment {
    /// The original record
    #[serde(flatten)]
    pub record: CommentRecord,

    /// Predicted sentiment; `None` when the comment was skipped
    pub sentiment: Option<SentimentLabel>,

    /// Confidence of the prediction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl AnalyzedComment {
    /// Build from a record and an optional prediction
    pub fn new(record: CommentRecord, prediction: Option<ScoredSentiment>) -> Self {
        Self {
            record,
            sentiment: prediction.map(|p| p.label),
            confidence: prediction.map(|p| p.score),
        }
    }

    /// Whether the comment was skipped instead of analyzed
    pub fn is_skipped(&self) -> bool {
        self.sentiment.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order_and_index() {
        for (idx, label) in SentimentLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), idx);
            assert_eq!(SentimentLabel::from_index(idx), Some(*label));
        }
        assert_eq!(SentimentLabel::from_index(5), None);
        assert!(SentimentLabel::VeryNegative < SentimentLabel::VeryPositive);
        assert!(SentimentLabel::Negative.is_negative());
        assert!(!SentimentLabel::Neutral.is_negative());
        assert!(!SentimentLabel::Neutral.is_positive());
        assert!(SentimentLabel::VeryPositive.is_positive());
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(
            "Very Negative".parse::<SentimentLabel>().unwrap(),
            SentimentLabel::VeryNegative
        );
        assert_eq!(
            "very_positive".parse::<SentimentLabel>().unwrap(),
            SentimentLabel::VeryPositive
        );
        assert_eq!(
            " NEUTRAL ".parse::<SentimentLabel>().unwrap(),
            SentimentLabel::Neutral
        );
        assert!("ecstatic".parse::<SentimentLabel>().is_err());
    }

    #[test]
    fn test_label_serde_uses_display_names() {
        let json = serde_json::to_string(&SentimentLabel::VeryPositive).unwrap();
        assert_eq!(json, "\"Very Positive\"");

        let label: SentimentLabel = serde_json::from_str("\"Negative\"").unwrap();
        assert_eq!(label, SentimentLabel::Negative);
        assert_eq!(label.to_string(), "Negative");
    }

    #[test]
    fn test_comment_record_passthrough() {
        let line = r#"{"user_id":"UC123","comment":"great stream","timestamp":"2024-05-01T10:00:00Z","channel":"live"}"#;
        let record: CommentRecord = serde_json::from_str(line).unwrap();

        assert_eq!(record.user_id.as_deref(), Some("UC123"));
        assert_eq!(record.text(), Some("great stream"));
        assert_eq!(record.extra.get("channel").unwrap(), "live");

        let analyzed = AnalyzedComment::new(
            record,
            Some(ScoredSentiment {
                label: SentimentLabel::Positive,
                score: 0.75,
            }),
        );
        let value = serde_json::to_value(&analyzed).unwrap();
        assert_eq!(value["sentiment"], "Positive");
        assert_eq!(value["channel"], "live");
        assert_eq!(value["comment"], "great stream");
        assert!((value["confidence"].as_f64().unwrap() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_blank_comment_has_no_text() {
        assert_eq!(CommentRecord::new("   ").text(), None);
        assert_eq!(CommentRecord::default().text(), None);

        let skipped = AnalyzedComment::new(CommentRecord::new(""), None);
        assert!(skipped.is_skipped());
        let value = serde_json::to_value(&skipped).unwrap();
        assert!(value["sentiment"].is_null());
        assert!(value.get("confidence").is_none());
    }
}
