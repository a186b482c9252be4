use async_openai::types::{
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::{LLMClient, LLMParams, TARGET_LLM_REQUEST};

/// Per-request timeout for the generative model.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Transient transport failures are retried this many times.
const MAX_RETRIES: u32 = 3;
/// Initial backoff delay, doubled after each failed attempt.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Send a prompt to the configured generative model and return the raw
/// response text. Transport errors and timeouts are retried with exponential
/// backoff; after the final attempt `None` is returned and the caller falls
/// back to its deterministic path.
pub async fn generate_llm_response(prompt: &str, params: &LLMParams) -> Option<String> {
    let mut backoff = BACKOFF_BASE;

    debug!(target: TARGET_LLM_REQUEST, "Starting LLM response generation ({} chars)", prompt.len());

    for retry_count in 0..MAX_RETRIES {
        let result = timeout(REQUEST_TIMEOUT, dispatch(prompt, params)).await;

        match result {
            Ok(Ok(response)) if !response.is_empty() => {
                debug!(target: TARGET_LLM_REQUEST, "LLM response received ({} chars)", response.len());
                return Some(response);
            }
            Ok(Ok(_)) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM returned an empty response");
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "Error generating response: {}", e);
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM request timed out after {:?}", REQUEST_TIMEOUT);
            }
        }

        if retry_count < MAX_RETRIES - 1 {
            info!(target: TARGET_LLM_REQUEST, "Retrying LLM request after {:?} ({}/{})", backoff, retry_count + 1, MAX_RETRIES);
            sleep(backoff).await;
            backoff *= 2;
        }
    }

    error!(target: TARGET_LLM_REQUEST, "No response generated after {} attempts", MAX_RETRIES);
    None
}

async fn dispatch(prompt: &str, params: &LLMParams) -> anyhow::Result<String> {
    match &params.llm_client {
        LLMClient::Ollama(ollama) => {
            let mut request = GenerationRequest::new(params.model.clone(), prompt.to_string());
            request.options =
                Some(GenerationOptions::default().temperature(params.temperature));
            let response = ollama.generate(request).await?;
            Ok(response.response)
        }
        LLMClient::OpenAI(client) => {
            let request = CreateChatCompletionRequestArgs::default()
                .model(&params.model)
                .temperature(params.temperature)
                .messages([ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into()])
                .build()?;
            let response = client.chat().create(request).await?;
            let content = response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .unwrap_or_default();
            Ok(content)
        }
    }
}
