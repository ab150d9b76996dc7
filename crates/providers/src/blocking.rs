//! Synchronous front for the async provider clients, for callers that run
//! chat turns on a plain worker thread.

use crate::router::ProviderRouter;
use anyhow::Result;
use shared::agent_api::ChatMessage;
use shared::events::{PullOutcome, PullProgress};
use shared::model_api::{ChatInvoker, InvokeError, ModelRegistry, RegistryError};
use shared::settings::AppSettings;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::warn;

/// Owns a tokio runtime and blocks on each provider call.
///
/// Must not be used from inside another tokio runtime.
pub struct BlockingProvider {
    runtime: Runtime,
    router: ProviderRouter,
}

impl BlockingProvider {
    pub fn new(settings: AppSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            router: ProviderRouter::new(settings),
        })
    }

    pub fn list_models(&self) -> Result<Vec<String>> {
        self.runtime.block_on(self.router.list_models())
    }
}

impl ChatInvoker for BlockingProvider {
    fn invoke(&self, model: &str, messages: &[ChatMessage]) -> Result<String, InvokeError> {
        self.runtime.block_on(self.router.generate(model, messages))
    }
}

/// Registry view of a hosted provider: its model list comes from the API and
/// nothing can be pulled.
pub struct RemoteCatalog {
    provider: Arc<BlockingProvider>,
}

impl RemoteCatalog {
    pub fn new(provider: Arc<BlockingProvider>) -> Self {
        Self { provider }
    }
}

impl ModelRegistry for RemoteCatalog {
    fn list_available_models(&self) -> Result<BTreeSet<String>, RegistryError> {
        self.provider
            .list_models()
            .map(|models| models.into_iter().collect())
            .map_err(|e| RegistryError::Unreachable(e.to_string()))
    }

    fn fetch_model(
        &self,
        model: &str,
        _on_progress: &mut dyn FnMut(PullProgress),
    ) -> PullOutcome {
        let provider = self.provider.router.provider();
        warn!(%provider, model, "hosted models cannot be downloaded");
        PullOutcome::Failed {
            reason: format!("{} models are hosted remotely and cannot be downloaded", provider),
        }
    }
}
