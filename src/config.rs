use std::env;

const DB_PATH_ENV: &str = "DB_PATH";
const PORT_ENV: &str = "PORT";
const NODE_ENV: &str = "NODE_ENV";
const LABELER_API_KEY_ENV: &str = "EXTERNAL_LABELER_API_KEY";
const LABELER_MODEL_ENV: &str = "LABELER_MODEL";
const LABELER_TEMPERATURE_ENV: &str = "LABELER_TEMPERATURE";
const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
const OLLAMA_PORT_ENV: &str = "OLLAMA_PORT";

/// Runtime configuration assembled from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    pub labeler_api_key: Option<String>,
    pub labeler_model: String,
    pub labeler_temperature: f32,
    pub ollama_host: String,
    pub ollama_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = env::var(DB_PATH_ENV).unwrap_or_else(|_| {
            // Production deployments run on read-only images with a writable /tmp.
            if env::var(NODE_ENV).as_deref() == Ok("production") {
                "/tmp/drishti.db".to_string()
            } else {
                "drishti.db".to_string()
            }
        });

        let port = env::var(PORT_ENV)
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3001);

        let labeler_temperature = env::var(LABELER_TEMPERATURE_ENV)
            .unwrap_or_else(|_| "0.0".to_string())
            .parse()
            .unwrap_or(0.0);

        Self {
            db_path,
            port,
            labeler_api_key: env::var(LABELER_API_KEY_ENV).ok(),
            labeler_model: env::var(LABELER_MODEL_ENV)
                .unwrap_or_else(|_| "llama3.2".to_string()),
            labeler_temperature,
            ollama_host: env::var(OLLAMA_HOST_ENV)
                .unwrap_or_else(|_| "http://localhost".to_string()),
            ollama_port: env::var(OLLAMA_PORT_ENV)
                .ok()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(11434),
        }
    }
}
