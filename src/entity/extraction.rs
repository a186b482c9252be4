use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{
    BertModel, Config as BertConfig, HiddenAct, PositionEmbeddingType,
};
use std::path::Path;
use tokenizers::Tokenizer;
use tokio::fs;
use tracing::{debug, info};

use super::{NER_MODEL_URL, NER_TOKENIZER_URL, TARGET_ENTITY};

/// BIO tag set of the token-classification head, in label-id order.
const NER_LABELS: [&str; 9] = [
    "O", "B-MISC", "I-MISC", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC",
];

/// Configuration for the BERT NER model
pub struct NerConfig {
    pub model_path: String,
    pub tokenizer_path: String,
    pub hidden_size: usize,
    pub max_length: usize,
    pub device: Device,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            model_path: "models/bert-base-ner.safetensors".to_string(),
            tokenizer_path: "models/ner-tokenizer.json".to_string(),
            hidden_size: 768,
            max_length: 256,
            device: Device::Cpu,
        }
    }
}

impl NerConfig {
    pub async fn ensure_models_exist(&self) -> Result<()> {
        if !Path::new("models").exists() {
            fs::create_dir("models").await?;
        }

        if !Path::new(&self.model_path).exists() {
            info!(target: TARGET_ENTITY, "Downloading NER model from {}", NER_MODEL_URL);
            let response = reqwest::get(NER_MODEL_URL).await?;
            let bytes = response.bytes().await?;
            fs::write(&self.model_path, bytes).await?;
            info!(target: TARGET_ENTITY, "Downloaded NER model to {}", self.model_path);
        }

        if !Path::new(&self.tokenizer_path).exists() {
            info!(target: TARGET_ENTITY, "Downloading NER tokenizer from {}", NER_TOKENIZER_URL);
            let response = reqwest::get(NER_TOKENIZER_URL).await?;
            let bytes = response.bytes().await?;
            fs::write(&self.tokenizer_path, bytes).await?;
            info!(target: TARGET_ENTITY, "Downloaded NER tokenizer to {}", self.tokenizer_path);
        }

        Ok(())
    }
}

/// Named-entity extractor over a BERT token-classification model. Optional:
/// when initialization fails the caller marks NER disabled for the process
/// and articles carry no entities.
pub struct EntityExtractor {
    model: BertModel,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    max_length: usize,
}

impl EntityExtractor {
    pub async fn init(config: NerConfig) -> Result<Self> {
        config.ensure_models_exist().await?;

        let bert_config = BertConfig {
            hidden_size: config.hidden_size,
            intermediate_size: 3072,
            max_position_embeddings: 512,
            num_attention_heads: 12,
            num_hidden_layers: 12,
            vocab_size: 28996,
            layer_norm_eps: 1e-12,
            pad_token_id: 0,
            hidden_act: HiddenAct::Gelu,
            hidden_dropout_prob: 0.0,
            type_vocab_size: 2,
            initializer_range: 0.02,
            position_embedding_type: PositionEmbeddingType::Absolute,
            use_cache: false,
            classifier_dropout: None,
            model_type: None,
        };

        let tensors = candle_core::safetensors::load_buffer(
            &std::fs::read(&config.model_path)?,
            &config.device,
        )
        .map_err(|e| anyhow::anyhow!("Failed to load NER tensors: {}", e))?;
        let vb = VarBuilder::from_tensors(tensors, candle_core::DType::F32, &config.device);

        let model = BertModel::load(vb.pp("bert"), &bert_config)
            .map_err(|e| anyhow::anyhow!("Failed to load NER BERT model: {}", e))?;
        let classifier =
            candle_nn::linear(config.hidden_size, NER_LABELS.len(), vb.pp("classifier"))
                .map_err(|e| anyhow::anyhow!("Failed to load NER classifier head: {}", e))?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load NER tokenizer: {}", e))?;

        info!(target: TARGET_ENTITY, "NER model initialized");

        Ok(Self {
            model,
            classifier,
            tokenizer,
            device: config.device,
            max_length: config.max_length,
        })
    }

    /// Extract named entities from a text. Per-call failures are the
    /// caller's signal to downgrade the article to "no entities".
    pub fn extract(&self, text: &str) -> Result<Vec<String>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("NER tokenization failed: {}", e))?;

        let max_len = self.max_length - 1;
        let tokens: Vec<String> = encoding
            .get_tokens()
            .iter()
            .take(max_len)
            .cloned()
            .collect();
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
        let logits = self.classifier.forward(&hidden_state)?;

        // [1, seq, labels] -> per-token label ids
        let tag_ids: Vec<u32> = logits.squeeze(0)?.argmax(1)?.to_vec1()?;
        let tags: Vec<&str> = tag_ids
            .iter()
            .map(|&id| NER_LABELS.get(id as usize).copied().unwrap_or("O"))
            .collect();

        let entities = decode_bio_tags(&tokens, &tags);
        debug!(target: TARGET_ENTITY, "Extracted {} entities from {} tokens", entities.len(), tokens.len());

        Ok(entities)
    }
}

/// Reconstruct entity strings from a BIO-tagged wordpiece stream.
///
/// `##`-prefixed continuations join the open entity without a separator;
/// `B-*` flushes and opens, `I-*` continues (opening if nothing is open),
/// `O` flushes. Entities of length <= 2 are discarded.
pub(crate) fn decode_bio_tags(tokens: &[String], tags: &[&str]) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String, entities: &mut Vec<String>| {
        let finished = current.trim().to_string();
        if finished.len() > 2 && !entities.contains(&finished) {
            entities.push(finished);
        }
        current.clear();
    };

    for (token, tag) in tokens.iter().zip(tags.iter()) {
        if let Some(continuation) = token.strip_prefix("##") {
            if !current.is_empty() {
                current.push_str(continuation);
            }
            continue;
        }

        if tag.starts_with("B-") {
            if !current.is_empty() {
                flush(&mut current, &mut entities);
            }
            current.push_str(token);
        } else if tag.starts_with("I-") {
            // Tolerant recovery: an I- tag with no open entity starts one.
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(token);
        } else if !current.is_empty() {
            flush(&mut current, &mut entities);
        }
    }

    if !current.is_empty() {
        flush(&mut current, &mut entities);
    }

    entities
}
