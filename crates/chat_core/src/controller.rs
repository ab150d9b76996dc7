//! One chat turn: make sure the model is there, pull it once if it is not,
//! then ask it.

use crate::conversation::Conversation;
use shared::events::{PullOutcome, PullProgress};
use shared::model_api::{is_model_listed, ChatInvoker, InvokeError, ModelRegistry, RegistryError};
use shared::settings::DEFAULT_SYSTEM_PROMPT;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a turn hands back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnResult {
    Reply(String),
    Diagnostic(String),
}

impl TurnResult {
    pub fn text(&self) -> &str {
        match self {
            TurnResult::Reply(text) | TurnResult::Diagnostic(text) => text,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, TurnResult::Reply(_))
    }
}

/// Why a turn ended without a reply. `Display` is the text shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Model missing from the registry. Recovered by a single pull.
    #[error("Model {model} was not found")]
    ModelNotFound { model: String },

    #[error("Sorry, there was an error: {0}")]
    Transport(#[from] RegistryError),

    #[error("Sorry, there was an error: {0}")]
    Invocation(InvokeError),

    #[error("Failed to download model {model}")]
    DownloadFailed { model: String, reason: String },

    #[error("Model {model} is still unavailable after downloading it")]
    StillUnavailable { model: String },
}

impl From<TurnError> for TurnResult {
    fn from(err: TurnError) -> Self {
        TurnResult::Diagnostic(err.to_string())
    }
}

/// Runs turns against a registry and a chat backend.
pub struct TurnController {
    registry: Arc<dyn ModelRegistry>,
    invoker: Arc<dyn ChatInvoker>,
    default_system_prompt: String,
}

impl TurnController {
    pub fn new(registry: Arc<dyn ModelRegistry>, invoker: Arc<dyn ChatInvoker>) -> Self {
        Self {
            registry,
            invoker,
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Prompt inserted into conversations that arrive without one.
    pub fn with_default_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_system_prompt = prompt.into();
        self
    }

    /// Process one user message.
    ///
    /// Pull progress is passed to `on_progress` as it happens. Every failure
    /// comes back as [`TurnResult::Diagnostic`]; on success the user message
    /// and the reply have been appended to `conversation`.
    pub fn execute_turn(
        &self,
        conversation: &mut Conversation,
        model_id: &str,
        user_text: &str,
        on_progress: &mut dyn FnMut(String),
    ) -> TurnResult {
        match self.run_turn(conversation, model_id, user_text, on_progress) {
            Ok(reply) => TurnResult::Reply(reply),
            Err(err) => {
                warn!(model = model_id, error = %err, "turn ended with a diagnostic");
                err.into()
            }
        }
    }

    fn run_turn(
        &self,
        conversation: &mut Conversation,
        model_id: &str,
        user_text: &str,
        on_progress: &mut dyn FnMut(String),
    ) -> Result<String, TurnError> {
        let mut fetched = false;
        loop {
            match self.attempt(conversation, model_id, user_text) {
                Err(TurnError::ModelNotFound { model }) if fetched => {
                    return Err(TurnError::StillUnavailable { model });
                }
                Err(TurnError::ModelNotFound { .. }) => {
                    fetched = true;
                    self.fetch(model_id, on_progress)?;
                }
                other => return other,
            }
        }
    }

    fn attempt(
        &self,
        conversation: &mut Conversation,
        model_id: &str,
        user_text: &str,
    ) -> Result<String, TurnError> {
        if conversation.ensure_system_prompt(&self.default_system_prompt) {
            debug!("inserted default system prompt");
        }

        let available = self.registry.list_available_models()?;
        if !is_model_listed(&available, model_id) {
            info!(model = model_id, "model not available locally");
            return Err(TurnError::ModelNotFound {
                model: model_id.to_string(),
            });
        }

        let mark = conversation.len();
        conversation.append_user(user_text);
        debug!(model = model_id, messages = conversation.len(), "invoking model");
        match self.invoker.invoke(model_id, conversation.messages()) {
            Ok(reply) => {
                conversation.append_assistant(reply.as_str());
                Ok(reply)
            }
            Err(InvokeError::ModelNotFound { model }) => {
                // Undo this attempt so a retry does not leave a duplicate.
                conversation.truncate(mark);
                Err(TurnError::ModelNotFound { model })
            }
            Err(err) => Err(TurnError::Invocation(err)),
        }
    }

    fn fetch(&self, model_id: &str, on_progress: &mut dyn FnMut(String)) -> Result<(), TurnError> {
        let outcome = self
            .registry
            .fetch_model(model_id, &mut |progress: PullProgress| {
                on_progress(progress.describe(model_id))
            });
        match outcome {
            PullOutcome::Completed { size_mb, .. } => {
                info!(model = model_id, ?size_mb, "model downloaded");
                Ok(())
            }
            PullOutcome::Failed { reason } => Err(TurnError::DownloadFailed {
                model: model_id.to_string(),
                reason,
            }),
        }
    }
}
