use anyhow::anyhow;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use shared::model_api::InvokeError;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

// Local generation on CPU can be slow, so the timeout is generous.
static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(600))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

pub struct OllamaClient {
    http: Client,
    base: String,
    model: String,
}

impl OllamaClient {
    /// `base_url` wins over `OLLAMA_BASE_URL`, which wins over localhost.
    pub fn new(model: &str, base_url: Option<&str>) -> Self {
        let base = base_url
            .map(str::to_string)
            .or_else(|| env::var("OLLAMA_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            http: SHARED_HTTP.clone(),
            base: base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<String, InvokeError> {
        let url = format!("{}/api/chat", self.base);
        let req = OllamaChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
        };
        debug!(model = %self.model, messages = messages.len(), "ollama chat request");

        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| anyhow!("ollama unreachable at {}: {}", self.base, e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_error(&self.model, status, &body));
        }
        let body: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| anyhow!("unreadable ollama response: {}", e))?;
        Ok(body.message.content)
    }
}

/// Map a failed `/api/chat` response onto an invoke error. A 404 naming a
/// missing model is the one case the caller can recover from.
fn classify_error(model: &str, status: StatusCode, body: &str) -> InvokeError {
    let detail = serde_json::from_str::<OllamaErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.chars().take(800).collect());

    if status == StatusCode::NOT_FOUND && detail.to_lowercase().contains("not found") {
        return InvokeError::ModelNotFound {
            model: model.to_string(),
        };
    }
    if detail.trim().is_empty() {
        InvokeError::Failed(anyhow!("ollama error: {}", status))
    } else {
        InvokeError::Failed(anyhow!("ollama error: {}: {}", status, detail.trim()))
    }
}
