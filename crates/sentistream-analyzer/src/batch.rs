//! Batch tokenization: truncation, padding and tensor construction

use candle_core::{Device, Tensor};
use sentistream_core::{Error, Result};
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, PostProcessor, Tokenizer,
    TruncationDirection, TruncationParams, TruncationStrategy,
};
use tracing::debug;

const PAD_TOKEN_CANDIDATES: [&str; 2] = ["[PAD]", "<pad>"];

/// Rectangular model inputs for one batch, each shaped `(batch, seq_len)` with dtype u32
#[derive(Debug, Clone)]
pub struct BatchTensors {
    pub input_ids: Tensor,

    /// 1 for real tokens, 0 for padding
    pub attention_mask: Tensor,

    pub token_type_ids: Tensor,
}

impl BatchTensors {
    pub fn batch_size(&self) -> usize {
        self.input_ids.dims().first().copied().unwrap_or(0)
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.dims().get(1).copied().unwrap_or(0)
    }
}

/// Token ids for a batch after truncation and padding, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl EncodedBatch {
    /// Token ids of one row, padding included
    pub fn row(&self, index: usize) -> &[u32] {
        let start = index * self.seq_len;
        &self.input_ids[start..start + self.seq_len]
    }

    /// Number of non-padding tokens in one row
    pub fn row_len(&self, index: usize) -> usize {
        let start = index * self.seq_len;
        self.attention_mask[start..start + self.seq_len]
            .iter()
            .filter(|&&m| m == 1)
            .count()
    }

    /// Move the batch onto a device
    pub fn to_tensors(&self, device: &Device) -> Result<BatchTensors> {
        let shape = (self.batch_size, self.seq_len);
        let tensor = |data: &[u32], what: &str| {
            Tensor::from_slice(data, shape, device).map_err(|e| {
                Error::inference(format!("failed to build {} tensor: {}", what, e))
            })
        };

        Ok(BatchTensors {
            input_ids: tensor(&self.input_ids, "input ids")?,
            attention_mask: tensor(&self.attention_mask, "attention mask")?,
            token_type_ids: tensor(&self.token_type_ids, "token type")?,
        })
    }
}

/// Tokenizer configured to emit rectangular, length-capped batches
#[derive(Clone)]
pub struct BatchEncoder {
    tokenizer: Tokenizer,
    max_length: usize,
    pad_id: u32,
}

impl BatchEncoder {
    /// Configure `tokenizer` for right-truncation to `max_length` tokens
    /// (special tokens included) and right-padding to the longest row.
    pub fn new(mut tokenizer: Tokenizer, max_length: usize) -> Result<Self> {
        let special_tokens = tokenizer
            .get_post_processor()
            .map(|p| p.added_tokens(false))
            .unwrap_or(0);
        if max_length <= special_tokens {
            return Err(Error::model_load(format!(
                "max_length {} leaves no room for text after {} special tokens",
                max_length, special_tokens
            )));
        }

        let (pad_id, pad_token) = resolve_pad_token(&tokenizer)?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                direction: TruncationDirection::Right,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
            }))
            .map_err(|e| Error::model_load(format!("failed to configure truncation: {}", e)))?;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            direction: PaddingDirection::Right,
            pad_id,
            pad_token,
            ..Default::default()
        }));

        debug!(max_length, pad_id, special_tokens, "batch encoder configured");
        Ok(Self {
            tokenizer,
            max_length,
            pad_id,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Encode texts into one padded batch, rows in input order
    pub fn encode(&self, texts: &[&str]) -> Result<EncodedBatch> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::tokenization(format!("failed to encode batch: {}", e)))?;

        let batch_size = encodings.len();
        let seq_len = encodings.first().map(|e| e.len()).unwrap_or(0);

        let mut batch = EncodedBatch {
            input_ids: Vec::with_capacity(batch_size * seq_len),
            attention_mask: Vec::with_capacity(batch_size * seq_len),
            token_type_ids: Vec::with_capacity(batch_size * seq_len),
            batch_size,
            seq_len,
        };

        for (row, encoding) in encodings.iter().enumerate() {
            if encoding.len() != seq_len || seq_len > self.max_length {
                return Err(Error::tokenization(format!(
                    "row {} has {} tokens, expected {} (max {})",
                    row,
                    encoding.len(),
                    seq_len,
                    self.max_length
                )));
            }
            batch.input_ids.extend_from_slice(encoding.get_ids());
            batch
                .attention_mask
                .extend_from_slice(encoding.get_attention_mask());
            batch.token_type_ids.extend_from_slice(encoding.get_type_ids());
        }

        Ok(batch)
    }
}

fn resolve_pad_token(tokenizer: &Tokenizer) -> Result<(u32, String)> {
    if let Some(padding) = tokenizer.get_padding() {
        return Ok((padding.pad_id, padding.pad_token.clone()));
    }

    PAD_TOKEN_CANDIDATES
        .iter()
        .find_map(|token| {
            tokenizer
                .token_to_id(token)
                .map(|id| (id, token.to_string()))
        })
        .ok_or_else(|| Error::model_load("tokenizer defines no padding token"))
}
