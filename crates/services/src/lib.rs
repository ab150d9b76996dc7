//! Local collaborators of the chat turn: the Ollama CLI registry and server,
//! the SQLite chat history, and hardware sizing.

pub mod capacity;
pub mod history;
pub mod ollama_manager;

pub use history::HistoryStore;
pub use ollama_manager::{OllamaCli, OllamaServer, ServerHandle, ServerOptions};
