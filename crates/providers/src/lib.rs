//! Chat backends: the local Ollama HTTP API and OpenAI-compatible hosted
//! APIs (OpenAI, TogetherAI), chosen by configuration.

pub mod blocking;
pub mod ollama;
pub mod openai;
pub mod router;

pub use blocking::{BlockingProvider, RemoteCatalog};
pub use router::ProviderRouter;
