use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_transformers::models::bert::BertModel;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::vector::config::{load_minilm_model, load_minilm_tokenizer, MiniLmConfig};
use crate::vector::TARGET_VECTOR;

/// Sentence embedder over a MiniLM-family BERT. One instance lives for the
/// process; inference is CPU-bound and the model is not reentrant, so calls
/// are made one at a time from a blocking worker.
pub struct Embedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    max_length: usize,
    dimensions: usize,
}

impl Embedder {
    /// Download weights if absent and load model plus tokenizer. A failure
    /// here is fatal for the pipeline run that requested it.
    pub async fn init(config: MiniLmConfig) -> Result<Self> {
        config.ensure_models_exist().await?;
        let model = load_minilm_model(&config)?;
        let tokenizer = load_minilm_tokenizer(&config)?;

        info!(target: TARGET_VECTOR, "Embedder initialized ({} dimensions)", config.dimensions);

        Ok(Self {
            model,
            tokenizer,
            device: config.device,
            max_length: config.max_length,
            dimensions: config.dimensions,
        })
    }

    /// Embed a text into a mean-pooled, L2-normalized vector of the fixed
    /// dimension.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        // Truncate to max_length - 1 to avoid index boundary issues
        let max_len = self.max_length - 1;
        let input_ids: Vec<i64> = encoding
            .get_ids()
            .iter()
            .take(max_len)
            .map(|&x| x as i64)
            .collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .take(max_len)
            .map(|&x| x as i64)
            .collect();

        let input_ids = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(attention_mask, &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden_state =
            self.model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Convert attention mask to float and expand for broadcasting
        let attention_mask_float = attention_mask.to_dtype(DType::F32)?;
        let attention_mask_expanded = attention_mask_float
            .unsqueeze(2)?
            .expand(hidden_state.shape())?;

        // Zero out padding embeddings, then mean over the valid tokens
        let masked_hidden = hidden_state.mul(&attention_mask_expanded)?;
        let summed_hidden = masked_hidden.sum(1)?;
        let valid_token_counts = attention_mask_float
            .sum(1)?
            .unsqueeze(1)?
            .clamp(1.0, f32::MAX)?;
        let valid_token_counts_expanded = valid_token_counts.expand(summed_hidden.shape())?;
        let mean_pooled = summed_hidden.div(&valid_token_counts_expanded)?;

        // Normalize the vector
        let norm = mean_pooled.sqr()?.sum(1)?.sqrt()?.unsqueeze(1)?;
        let norm_expanded = norm.expand(mean_pooled.shape())?;
        let normalized = mean_pooled.div(&norm_expanded)?;

        let vector = normalized.squeeze(0)?.to_vec1::<f32>()?;

        if vector.len() != self.dimensions {
            return Err(anyhow::anyhow!(
                "Unexpected embedding dimensions: got {}, expected {}",
                vector.len(),
                self.dimensions
            ));
        }

        debug!(target: TARGET_VECTOR, "Embedded {} chars into {} dimensions", text.len(), vector.len());

        Ok(vector)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}
