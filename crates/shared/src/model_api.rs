//! Seams between the turn controller and the outside world: the local model
//! registry and whatever backend answers a chat call.

use std::collections::BTreeSet;

use crate::agent_api::ChatMessage;
use crate::events::{PullOutcome, PullProgress};

/// The registry could not be queried (runtime not installed, not running, ...).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("could not run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    Unreachable(String),
}

/// A chat call failed.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("model {model} not found")]
    ModelNotFound { model: String },

    #[error("{0}")]
    Failed(#[from] anyhow::Error),
}

/// Tracks which models exist locally and can fetch new ones.
pub trait ModelRegistry: Send + Sync {
    fn list_available_models(&self) -> Result<BTreeSet<String>, RegistryError>;

    /// Pull `model`, handing each progress line to `on_progress` as it arrives.
    fn fetch_model(&self, model: &str, on_progress: &mut dyn FnMut(PullProgress))
        -> PullOutcome;
}

/// Anything that can turn an ordered message list into an assistant reply.
pub trait ChatInvoker: Send + Sync {
    fn invoke(&self, model: &str, messages: &[ChatMessage]) -> Result<String, InvokeError>;
}

/// Whether `model` is present in `available`. An untagged id also matches its
/// `:latest` tag, which is how the runtime lists default pulls.
pub fn is_model_listed(available: &BTreeSet<String>, model: &str) -> bool {
    if available.contains(model) {
        return true;
    }
    !model.contains(':') && available.contains(&format!("{}:latest", model))
}
