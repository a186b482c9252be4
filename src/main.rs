use anyhow::Result;
use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;
use std::sync::Arc;
use tracing::{error, info, warn};

use drishti::api::{self, AppState};
use drishti::config::Config;
use drishti::db::Database;
use drishti::entity::NerConfig;
use drishti::labeler::Labeler;
use drishti::logging;
use drishti::pipeline::Pipeline;
use drishti::vector::MiniLmConfig;
use drishti::{LLMClient, LLMParams};

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let config = Config::from_env();
    info!("Starting drishti on port {} (store: {})", config.port, config.db_path);

    let db = match Database::open_with_fallback(&config.db_path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database and in-memory fallback: {}", e);
            std::process::exit(1);
        }
    };

    let llm_client = match &config.labeler_api_key {
        Some(api_key) => {
            info!("Configuring external labeler via API key for model '{}'", config.labeler_model);
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            LLMClient::OpenAI(OpenAIClient::with_config(openai_config))
        }
        None => {
            info!(
                "No labeler API key; using local model '{}' at {}:{}",
                config.labeler_model, config.ollama_host, config.ollama_port
            );
            LLMClient::Ollama(Ollama::new(
                config.ollama_host.clone(),
                config.ollama_port,
            ))
        }
    };

    let labeler = Labeler::new(LLMParams {
        llm_client,
        model: config.labeler_model.clone(),
        temperature: config.labeler_temperature,
    });

    let pipeline = Arc::new(Pipeline::new(db.clone(), labeler));

    // Warm the model weights in the background so the first pipeline run
    // does not stall on a cold download.
    tokio::spawn(async {
        if let Err(e) = MiniLmConfig::default().ensure_models_exist().await {
            warn!("Embedding model prefetch failed: {}", e);
        }
        if let Err(e) = NerConfig::default().ensure_models_exist().await {
            warn!("NER model prefetch failed: {}", e);
        }
    });

    api::serve(AppState { db, pipeline }, config.port).await
}
