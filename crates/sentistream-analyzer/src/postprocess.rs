//! Logits to probabilities and predicted classes

use candle_core::{DType, Tensor, D};
use sentistream_core::{Error, Result};

/// Tolerance on the row sum of a probability distribution
pub const PROBABILITY_SUM_TOLERANCE: f32 = 1e-4;

/// Row-wise softmax of `(batch, classes)` logits
pub fn softmax_rows(logits: &Tensor) -> Result<Vec<Vec<f32>>> {
    let logits = logits
        .to_dtype(DType::F32)
        .map_err(|e| Error::inference(format!("failed to cast logits: {}", e)))?;

    candle_nn::ops::softmax(&logits, D::Minus1)
        .and_then(|probs| probs.to_vec2::<f32>())
        .map_err(|e| Error::inference(format!("softmax failed: {}", e)))
}

/// Index and value of the largest entry; the lowest index wins ties.
///
/// Returns `None` for an empty row.
pub fn argmax(row: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in row.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((index, value)),
        }
    }
    best
}

/// Reject rows that are not a finite probability distribution
pub fn check_distribution(row: &[f32]) -> Result<()> {
    if let Some(value) = row.iter().find(|p| !p.is_finite()) {
        return Err(Error::inference(format!(
            "model produced a non-finite probability ({})",
            value
        )));
    }

    let sum: f32 = row.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
        return Err(Error::inference(format!(
            "class probabilities sum to {} instead of 1",
            sum
        )));
    }

    Ok(())
}
