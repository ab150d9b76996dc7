use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use shared::model_api::InvokeError;
use shared::settings::ProviderAuth;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz";

// ── Request / response types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModelList {
    data: Vec<OpenAIModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Client for any OpenAI-compatible chat completions endpoint. TogetherAI
/// speaks the same protocol and only differs in base URL and key.
pub struct OpenAIClient {
    http: Client,
    label: &'static str,
    auth_token: String,
    model: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn openai(model: &str, auth: &ProviderAuth, base_url: Option<&str>) -> Result<Self> {
        Self::from_auth(
            "openai",
            model,
            auth,
            base_url.unwrap_or(OPENAI_BASE_URL),
            "OPENAI_API_KEY",
        )
    }

    pub fn together(model: &str, auth: &ProviderAuth) -> Result<Self> {
        Self::from_auth(
            "togetherai",
            model,
            auth,
            TOGETHER_BASE_URL,
            "TOGETHER_API_KEY",
        )
    }

    fn from_auth(
        label: &'static str,
        model: &str,
        auth: &ProviderAuth,
        base_url: &str,
        key_var: &str,
    ) -> Result<Self> {
        let auth_token = match &auth.api_key {
            Some(key) if !key.trim().is_empty() => key.clone(),
            _ => env::var(key_var)
                .map_err(|_| anyhow!("No {} API key configured (set {})", label, key_var))?,
        };

        Ok(Self {
            http: SHARED_HTTP.clone(),
            label,
            auth_token,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<String, InvokeError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let req = OpenAIRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };
        debug!(provider = self.label, model = %self.model, messages = messages.len(), "chat completion request");

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| anyhow!("{} request failed: {}", self.label, e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_error(self.label, &self.model, status, &body));
        }
        let body: OpenAIResponse = resp
            .json()
            .await
            .map_err(|e| anyhow!("unreadable {} response: {}", self.label, e))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InvokeError::Failed(anyhow!("{} returned no choices", self.label)))
    }

    /// Model ids the endpoint will accept.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/models", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("{} error: {}", self.label, resp.status()));
        }
        // TogetherAI returns a bare array, OpenAI wraps it in `data`.
        let body: serde_json::Value = resp.json().await?;
        let models: Vec<OpenAIModel> = if body.is_array() {
            serde_json::from_value(body)?
        } else {
            serde_json::from_value::<OpenAIModelList>(body)?.data
        };
        Ok(models.into_iter().map(|m| m.id).collect())
    }
}

fn classify_error(label: &str, model: &str, status: StatusCode, body: &str) -> InvokeError {
    let (message, code) = match serde_json::from_str::<OpenAIErrorBody>(body) {
        Ok(parsed) => (parsed.error.message, parsed.error.code),
        Err(_) => (body.chars().take(800).collect(), None),
    };

    if status == StatusCode::NOT_FOUND && code.as_deref() == Some("model_not_found") {
        return InvokeError::ModelNotFound {
            model: model.to_string(),
        };
    }
    if message.trim().is_empty() {
        InvokeError::Failed(anyhow!("{} error: {}", label, status))
    } else {
        InvokeError::Failed(anyhow!("{} error: {}\n{}", label, status, message.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_key_wins() {
        let auth = ProviderAuth {
            api_key: Some("sk-test".into()),
        };
        let client = OpenAIClient::together("meta-llama/Llama-3-8b", &auth).unwrap();
        assert_eq!(client.auth_token, "sk-test");
        assert_eq!(client.base_url, TOGETHER_BASE_URL);
    }

    #[test]
    fn test_custom_base_url_is_trimmed() {
        let auth = ProviderAuth {
            api_key: Some("k".into()),
        };
        let client = OpenAIClient::openai("gpt-4o-mini", &auth, Some("http://localhost:8080/"))
            .unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_model_not_found_code() {
        let body = r#"{"error":{"message":"The model `gpt-9` does not exist","code":"model_not_found"}}"#;
        let err = classify_error("openai", "gpt-9", StatusCode::NOT_FOUND, body);
        assert!(matches!(err, InvokeError::ModelNotFound { .. }));
    }

    #[test]
    fn test_auth_error_is_failure() {
        let body = r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#;
        let err = classify_error("openai", "gpt-4o-mini", StatusCode::UNAUTHORIZED, body);
        assert!(err.to_string().contains("Incorrect API key"));
    }
}
