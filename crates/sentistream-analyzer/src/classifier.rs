//! Sequence classifiers over pretrained transformer encoders

use crate::batch::BatchTensors;
use crate::model_loader::{
    load_var_builder, parse_json_config, Architecture, ModelFiles, ModelManifest,
};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use candle_transformers::models::xlm_roberta::{
    Config as XlmRobertaConfig, XLMRobertaForSequenceClassification,
};
use sentistream_core::{Error, Result};
use tracing::{debug, info, warn};

/// A model mapping a token batch to one row of class logits per text
pub trait SequenceClassifier: Send + Sync {
    /// Short architecture name
    fn name(&self) -> &str;

    /// Width of the logits rows
    fn num_labels(&self) -> usize;

    /// Longest input, special tokens included, the position embeddings can address
    fn max_positions(&self) -> Option<usize> {
        None
    }

    /// Forward pass; returns logits shaped `(batch, num_labels)`
    fn forward(&self, batch: &BatchTensors) -> candle_core::Result<Tensor>;
}

/// Load the classifier described by `config.json`
pub fn load_classifier(
    files: &ModelFiles,
    manifest: &ModelManifest,
    device: &Device,
) -> Result<Box<dyn SequenceClassifier>> {
    let architecture = manifest.architecture()?;
    let num_labels = manifest.num_classes();
    let vb = load_var_builder(&files.weights, device)?;

    info!(
        architecture = architecture.as_str(),
        num_labels, "loading sequence classifier"
    );

    let classifier: Box<dyn SequenceClassifier> = match architecture {
        Architecture::DistilBert => {
            let config: DistilBertConfig = parse_json_config(&files.config)?;
            Box::new(DistilBertClassifier::load(&vb, &config, manifest, num_labels)?)
        }
        Architecture::Bert => {
            let config: BertConfig = parse_json_config(&files.config)?;
            Box::new(BertClassifier::load(&vb, &config, manifest, num_labels)?)
        }
        Architecture::XlmRoberta => {
            let config: XlmRobertaConfig = parse_json_config(&files.config)?;
            Box::new(XlmRobertaClassifier::load(&vb, &config, manifest, num_labels)?)
        }
    };

    Ok(classifier)
}

/// DistilBERT encoder with `pre_classifier` + ReLU + `classifier` head
pub struct DistilBertClassifier {
    model: DistilBertModel,
    pre_classifier: Option<Linear>,
    classifier: Linear,
    num_labels: usize,
    max_positions: Option<usize>,
}

impl DistilBertClassifier {
    fn load(
        vb: &VarBuilder,
        config: &DistilBertConfig,
        manifest: &ModelManifest,
        num_labels: usize,
    ) -> Result<Self> {
        let hidden_size = manifest.hidden_size()?;

        let model = with_prefixes(vb, &["distilbert", ""], "DistilBERT encoder", |vb| {
            DistilBertModel::load(vb, config)
        })?;

        let pre_classifier = load_dense(vb, &["pre_classifier"], hidden_size, manifest)?;

        let classifier = load_head(vb, hidden_size, num_labels)?;

        Ok(Self {
            model,
            pre_classifier,
            classifier,
            num_labels,
            max_positions: manifest.max_position_embeddings,
        })
    }
}

impl SequenceClassifier for DistilBertClassifier {
    fn name(&self) -> &str {
        Architecture::DistilBert.as_str()
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn max_positions(&self) -> Option<usize> {
        self.max_positions
    }

    fn forward(&self, batch: &BatchTensors) -> candle_core::Result<Tensor> {
        // DistilBERT masks positions where the mask is 1, shaped (batch, 1, 1, seq)
        let padding_mask = batch
            .attention_mask
            .eq(0u32)?
            .unsqueeze(1)?
            .unsqueeze(1)?;

        let hidden_states = self.model.forward(&batch.input_ids, &padding_mask)?;
        let cls = hidden_states.i((.., 0))?;

        let pooled = match &self.pre_classifier {
            Some(pre_classifier) => pre_classifier.forward(&cls)?.relu()?,
            None => cls,
        };

        self.classifier.forward(&pooled)
    }
}

/// BERT encoder with tanh pooler and `classifier` head
pub struct BertClassifier {
    model: BertModel,
    pooler: Option<Linear>,
    classifier: Linear,
    num_labels: usize,
    max_positions: Option<usize>,
}

impl BertClassifier {
    fn load(
        vb: &VarBuilder,
        config: &BertConfig,
        manifest: &ModelManifest,
        num_labels: usize,
    ) -> Result<Self> {
        let hidden_size = manifest.hidden_size()?;

        let model = with_prefixes(vb, &["bert", ""], "BERT encoder", |vb| {
            BertModel::load(vb, config)
        })?;

        let pooler = load_dense(
            vb,
            &["bert.pooler.dense", "pooler.dense"],
            hidden_size,
            manifest,
        )?;

        let classifier = load_head(vb, hidden_size, num_labels)?;

        Ok(Self {
            model,
            pooler,
            classifier,
            num_labels,
            max_positions: manifest.max_position_embeddings,
        })
    }
}

impl SequenceClassifier for BertClassifier {
    fn name(&self) -> &str {
        Architecture::Bert.as_str()
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn max_positions(&self) -> Option<usize> {
        self.max_positions
    }

    fn forward(&self, batch: &BatchTensors) -> candle_core::Result<Tensor> {
        let hidden_states = self.model.forward(
            &batch.input_ids,
            &batch.token_type_ids,
            Some(&batch.attention_mask),
        )?;
        let cls = hidden_states.i((.., 0))?;

        let pooled = match &self.pooler {
            Some(pooler) => pooler.forward(&cls)?.tanh()?,
            None => cls,
        };

        self.classifier.forward(&pooled)
    }
}

/// XLM-RoBERTa with its own dense + out_proj classification head
pub struct XlmRobertaClassifier {
    model: XLMRobertaForSequenceClassification,
    num_labels: usize,
    max_positions: Option<usize>,
}

impl XlmRobertaClassifier {
    fn load(
        vb: &VarBuilder,
        config: &XlmRobertaConfig,
        manifest: &ModelManifest,
        num_labels: usize,
    ) -> Result<Self> {
        let model = with_prefixes(vb, &["", "model"], "XLM-RoBERTa model", |vb| {
            XLMRobertaForSequenceClassification::new(num_labels, config, vb)
        })?;

        // Positions are offset past the padding index
        let max_positions = manifest
            .max_position_embeddings
            .map(|n| n.saturating_sub(2));

        Ok(Self {
            model,
            num_labels,
            max_positions,
        })
    }
}

impl SequenceClassifier for XlmRobertaClassifier {
    fn name(&self) -> &str {
        Architecture::XlmRoberta.as_str()
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn max_positions(&self) -> Option<usize> {
        self.max_positions
    }

    fn forward(&self, batch: &BatchTensors) -> candle_core::Result<Tensor> {
        self.model.forward(
            &batch.input_ids,
            &batch.attention_mask,
            &batch.token_type_ids,
        )
    }
}

/// Try each weight prefix in turn, reporting all failures if none loads
fn with_prefixes<T>(
    vb: &VarBuilder,
    prefixes: &[&str],
    what: &str,
    load: impl Fn(VarBuilder) -> candle_core::Result<T>,
) -> Result<T> {
    let mut errors = Vec::new();

    for prefix in prefixes {
        let vb_prefix = if prefix.is_empty() {
            vb.clone()
        } else {
            vb.pp(*prefix)
        };
        let shown = if prefix.is_empty() { "<root>" } else { *prefix };

        match load(vb_prefix) {
            Ok(model) => {
                debug!("loaded {} from '{}'", what, shown);
                return Ok(model);
            }
            Err(e) => errors.push(format!("{}: {}", shown, e)),
        }
    }

    Err(Error::model_load(format!(
        "failed to load {} with tried prefixes [{}]",
        what,
        errors.join(" | ")
    )))
}

/// Square dense layer between the `[CLS]` state and the head.
///
/// Checkpoints exported as `*ForSequenceClassification` were trained through
/// this layer, so it must be present. Bare encoders run without it.
fn load_dense(
    vb: &VarBuilder,
    prefixes: &[&str],
    hidden_size: usize,
    manifest: &ModelManifest,
) -> Result<Option<Linear>> {
    let mut errors = Vec::new();

    for prefix in prefixes {
        match candle_nn::linear(hidden_size, hidden_size, vb.pp(*prefix)) {
            Ok(layer) => {
                debug!("loaded dense layer from '{}'", prefix);
                return Ok(Some(layer));
            }
            Err(e) => errors.push(format!("{}: {}", prefix, e)),
        }
    }

    if manifest.has_classification_head() {
        return Err(Error::model_load(format!(
            "{} checkpoint is missing its ({}, {}) dense layer [{}]",
            manifest.architectures.join(", "),
            hidden_size,
            hidden_size,
            errors.join(" | ")
        )));
    }

    warn!(
        tried = ?prefixes,
        "no dense layer before the head, feeding [CLS] state directly"
    );
    Ok(None)
}

/// The final `classifier` projection; a missing head is a load error
fn load_head(vb: &VarBuilder, hidden_size: usize, num_labels: usize) -> Result<Linear> {
    candle_nn::linear(hidden_size, num_labels, vb.pp("classifier")).map_err(|e| {
        Error::model_load(format!(
            "no classification head with shape ({}, {}) in weights: {}",
            num_labels, hidden_size, e
        ))
    })
}
