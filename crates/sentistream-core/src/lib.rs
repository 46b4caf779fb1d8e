//! Sentistream Core
//!
//! Core types and error handling shared across sentistream components.
//!
//! This crate provides:
//! - The five-class ordinal [`SentimentLabel`] and the per-text result types
//! - The comment record shape consumed and produced by the comment processor
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    AnalyzedComment, ClassDistribution, CommentRecord, ScoredSentiment, SentimentLabel,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ClassDistribution, ScoredSentiment, SentimentLabel};
}
