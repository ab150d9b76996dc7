use crate::ollama::OllamaClient;
use crate::openai::OpenAIClient;
use anyhow::{anyhow, Result};
use shared::agent_api::ChatMessage;
use shared::model_api::InvokeError;
use shared::settings::{AppSettings, ProviderKind};

/// Sends chat calls to whichever provider the settings select.
pub struct ProviderRouter {
    config: AppSettings,
}

impl ProviderRouter {
    pub fn new(config: AppSettings) -> Self {
        Self { config }
    }

    pub fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    pub async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, InvokeError> {
        match self.config.provider {
            ProviderKind::Ollama => {
                let client = OllamaClient::new(model, self.config.ollama.base_url.as_deref());
                client.generate(messages).await
            }
            ProviderKind::OpenAI => {
                let client = OpenAIClient::openai(
                    model,
                    &self.config.openai_auth,
                    self.config.openai_base_url.as_deref(),
                )?;
                client.generate(messages).await
            }
            ProviderKind::TogetherAI => {
                let client = OpenAIClient::together(model, &self.config.togetherai_auth)?;
                client.generate(messages).await
            }
        }
    }

    /// Models a hosted provider will serve. The local runtime is listed through
    /// its CLI instead.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        match self.config.provider {
            ProviderKind::Ollama => Err(anyhow!("list local models through the ollama registry")),
            ProviderKind::OpenAI => {
                OpenAIClient::openai(
                    &self.config.openai_model,
                    &self.config.openai_auth,
                    self.config.openai_base_url.as_deref(),
                )?
                .list_models()
                .await
            }
            ProviderKind::TogetherAI => {
                OpenAIClient::together(&self.config.togetherai_model, &self.config.togetherai_auth)?
                    .list_models()
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_invoke_failure() {
        std::env::remove_var("TOGETHER_API_KEY");
        let settings = AppSettings {
            provider: ProviderKind::TogetherAI,
            ..AppSettings::default()
        };
        let router = ProviderRouter::new(settings);
        let err = router
            .generate("any", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Failed(_)));
        assert!(err.to_string().contains("TOGETHER_API_KEY"));
    }

    #[tokio::test]
    async fn test_local_listing_goes_elsewhere() {
        let router = ProviderRouter::new(AppSettings::default());
        assert!(router.list_models().await.is_err());
    }
}
