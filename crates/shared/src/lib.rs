pub mod events;
pub mod model_api;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::str::FromStr;

    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant";

    fn default_ollama_binary() -> String {
        if cfg!(windows) {
            "ollama.exe".into()
        } else {
            "ollama".into()
        }
    }

    fn default_ollama_port() -> u16 {
        11434
    }

    fn default_local_model() -> String {
        "llama3.2:3b".into()
    }

    fn default_openai_model() -> String {
        "gpt-4o-mini".into()
    }

    fn default_togetherai_model() -> String {
        "meta-llama/Llama-3.3-70B-Instruct-Turbo".into()
    }

    fn default_system_prompt() -> String {
        DEFAULT_SYSTEM_PROMPT.into()
    }

    /// Which backend answers chat turns.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum ProviderKind {
        #[default]
        Ollama,
        OpenAI,
        TogetherAI,
    }

    impl ProviderKind {
        pub fn as_str(&self) -> &'static str {
            match self {
                ProviderKind::Ollama => "ollama",
                ProviderKind::OpenAI => "openai",
                ProviderKind::TogetherAI => "togetherai",
            }
        }

        /// Only the local runtime has a registry that can pull missing models.
        pub fn is_local(&self) -> bool {
            matches!(self, ProviderKind::Ollama)
        }
    }

    impl fmt::Display for ProviderKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for ProviderKind {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.to_lowercase().as_str() {
                "ollama" | "local" => Ok(ProviderKind::Ollama),
                "openai" => Ok(ProviderKind::OpenAI),
                "togetherai" | "together" => Ok(ProviderKind::TogetherAI),
                other => Err(format!("unknown provider: {}", other)),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct ProviderAuth {
        pub api_key: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OllamaSettings {
        #[serde(default = "default_ollama_binary")]
        pub binary: String,
        /// HTTP endpoint for chat calls; falls back to `OLLAMA_BASE_URL`, then localhost.
        #[serde(default)]
        pub base_url: Option<String>,
        #[serde(default = "default_local_model")]
        pub model: String,
        #[serde(default = "default_ollama_port")]
        pub port: u16,
        #[serde(default)]
        pub use_gpu: bool,
    }

    impl Default for OllamaSettings {
        fn default() -> Self {
            Self {
                binary: default_ollama_binary(),
                base_url: None,
                model: default_local_model(),
                port: default_ollama_port(),
                use_gpu: false,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        #[serde(default)]
        pub provider: ProviderKind,
        #[serde(default)]
        pub ollama: OllamaSettings,
        #[serde(default = "default_openai_model")]
        pub openai_model: String,
        #[serde(default)]
        pub openai_auth: ProviderAuth,
        #[serde(default)]
        pub openai_base_url: Option<String>,
        #[serde(default = "default_togetherai_model")]
        pub togetherai_model: String,
        #[serde(default)]
        pub togetherai_auth: ProviderAuth,
        #[serde(default = "default_system_prompt")]
        pub system_prompt: String,
        /// SQLite file for chat history; defaults to the data dir when unset.
        #[serde(default)]
        pub history_path: Option<String>,
    }

    impl AppSettings {
        /// Model id used when the caller doesn't name one.
        pub fn default_model(&self) -> &str {
            match self.provider {
                ProviderKind::Ollama => &self.ollama.model,
                ProviderKind::OpenAI => &self.openai_model,
                ProviderKind::TogetherAI => &self.togetherai_model,
            }
        }
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                provider: ProviderKind::default(),
                ollama: OllamaSettings::default(),
                openai_model: default_openai_model(),
                openai_auth: ProviderAuth::default(),
                openai_base_url: None,
                togetherai_model: default_togetherai_model(),
                togetherai_auth: ProviderAuth::default(),
                system_prompt: default_system_prompt(),
                history_path: None,
            }
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        System,
        User,
        Assistant,
    }

    impl Role {
        pub fn as_str(&self) -> &'static str {
            match self {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            }
        }
    }

    impl fmt::Display for Role {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for Role {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "system" => Ok(Role::System),
                "user" => Ok(Role::User),
                "assistant" => Ok(Role::Assistant),
                other => Err(format!("unknown role: {}", other)),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn new(role: Role, content: impl Into<String>) -> Self {
            Self {
                role,
                content: content.into(),
            }
        }

        pub fn system(content: impl Into<String>) -> Self {
            Self::new(Role::System, content)
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self::new(Role::User, content)
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self::new(Role::Assistant, content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::agent_api::{ChatMessage, Role};
    use super::settings::{AppSettings, ProviderKind};

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_message_serializes_lowercase_role() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"provider":"togetherai","ollama":{"model":"gemma2:2b"}}"#)
                .unwrap();
        assert_eq!(settings.provider, ProviderKind::TogetherAI);
        assert_eq!(settings.ollama.model, "gemma2:2b");
        assert_eq!(settings.ollama.port, 11434);
        assert_eq!(settings.system_prompt, "You are a helpful assistant");
        assert_eq!(
            settings.default_model(),
            "meta-llama/Llama-3.3-70B-Instruct-Turbo"
        );
    }

    #[test]
    fn test_provider_aliases() {
        assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!("Together".parse::<ProviderKind>().unwrap(), ProviderKind::TogetherAI);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }
}
