//! Chat front-end: builds the turn controller from settings and drives it
//! from the terminal.

use crate::cli::ChatArgs;
use crate::utils::history_db_path;
use anyhow::{anyhow, Result};
use chat_core::{ChatWorker, Conversation, TurnController, TurnResult};
use providers::{BlockingProvider, RemoteCatalog};
use services::history::chat_title_for;
use services::{HistoryStore, OllamaCli};
use shared::agent_api::ChatMessage;
use shared::model_api::ModelRegistry;
use shared::settings::{AppSettings, ProviderKind};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// Registry and invoker for the configured provider. Hosted providers get a
/// catalog that lists models but cannot pull them.
pub fn build_controller(settings: &AppSettings) -> Result<TurnController> {
    let provider = Arc::new(BlockingProvider::new(settings.clone())?);
    let registry: Arc<dyn ModelRegistry> = if settings.provider.is_local() {
        Arc::new(OllamaCli::new(settings.ollama.binary.clone()))
    } else {
        Arc::new(RemoteCatalog::new(provider.clone()))
    };
    info!(provider = %settings.provider, "chat backend ready");
    Ok(TurnController::new(registry, provider)
        .with_default_system_prompt(settings.system_prompt.clone()))
}

fn with_provider(settings: &AppSettings, provider: Option<ProviderKind>) -> AppSettings {
    let mut settings = settings.clone();
    if let Some(provider) = provider {
        settings.provider = provider;
    }
    settings
}

/// One turn, no history. Returns whether the model replied.
pub fn ask(
    settings: &AppSettings,
    text: &str,
    model: Option<String>,
    provider: Option<ProviderKind>,
) -> Result<bool> {
    let settings = with_provider(settings, provider);
    let model = model.unwrap_or_else(|| settings.default_model().to_string());
    let controller = build_controller(&settings)?;
    let mut conversation = Conversation::new(Some(settings.system_prompt.as_str()));

    let result = controller.execute_turn(&mut conversation, &model, text, &mut |progress| {
        eprintln!("{}", progress);
    });
    match result {
        TurnResult::Reply(reply) => {
            println!("{}", reply);
            Ok(true)
        }
        TurnResult::Diagnostic(message) => {
            eprintln!("{}", message);
            Ok(false)
        }
    }
}

/// Saves what each turn added, creating the chat row on the first turn that
/// adds anything.
struct ChatRecorder {
    store: Option<HistoryStore>,
    chat_id: Option<i64>,
    pending: Vec<ChatMessage>,
}

impl ChatRecorder {
    fn record(&mut self, user_text: &str, appended: &[ChatMessage]) {
        let Some(store) = &self.store else {
            return;
        };
        if appended.is_empty() {
            return;
        }
        let chat_id = match self.chat_id {
            Some(id) => id,
            None => match store.create_chat(&chat_title_for(user_text)) {
                Ok(id) => {
                    self.chat_id = Some(id);
                    id
                }
                Err(e) => {
                    warn!(error = %e, "could not create chat; history disabled");
                    self.store = None;
                    return;
                }
            },
        };
        for message in self.pending.drain(..).chain(appended.iter().cloned()) {
            if let Err(e) = store.save_message(chat_id, &message) {
                warn!(chat_id, error = %e, "failed to save message");
            }
        }
    }
}

fn open_history(settings: &AppSettings) -> Option<HistoryStore> {
    let path = history_db_path(settings)?;
    match HistoryStore::open(&path) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "chat history unavailable");
            None
        }
    }
}

pub fn run_chat(settings: &AppSettings, args: ChatArgs) -> Result<()> {
    let mut settings = with_provider(settings, args.provider);
    if let Some(prompt) = args.system_prompt {
        settings.system_prompt = prompt;
    }
    let model = args
        .model
        .unwrap_or_else(|| settings.default_model().to_string());
    let store = open_history(&settings);

    let (conversation, chat_id) = match args.resume {
        Some(id) => {
            let store = store
                .as_ref()
                .ok_or_else(|| anyhow!("chat history is unavailable, cannot resume"))?;
            if !store.chat_exists(id)? {
                return Err(anyhow!("no saved chat with id {}", id));
            }
            (Conversation::from_history(store.load_messages(id)?), Some(id))
        }
        None => (Conversation::new(Some(settings.system_prompt.as_str())), None),
    };
    let pending = if chat_id.is_none() {
        conversation.messages().to_vec()
    } else {
        Vec::new()
    };
    let mut recorder = ChatRecorder {
        store,
        chat_id,
        pending,
    };

    if chat_id.is_some() {
        for message in conversation.messages() {
            println!("{}: {}", message.role, message.content);
        }
    }

    let controller = Arc::new(build_controller(&settings)?);
    let worker = ChatWorker::spawn(controller, conversation)?;
    println!("Chatting with {} via {}. Type /quit to leave.", model, settings.provider);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" || text == "/exit" {
            break;
        }

        let (result, appended) = worker.run_turn(&model, text, &mut |progress| {
            println!("{}", progress);
        })?;
        println!("{}", result.text());
        recorder.record(text, &appended);
    }

    let conversation = worker.shutdown()?;
    info!(messages = conversation.len(), chat_id = ?recorder.chat_id, "chat ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::agent_api::Role;

    #[test]
    fn test_recorder_creates_chat_on_first_reply() {
        let mut recorder = ChatRecorder {
            store: Some(HistoryStore::open_in_memory().unwrap()),
            chat_id: None,
            pending: vec![ChatMessage::system("You are a helpful assistant")],
        };

        // Nothing was added, so nothing is saved.
        recorder.record("hi", &[]);
        assert!(recorder.chat_id.is_none());

        recorder.record(
            "What is Rust?",
            &[ChatMessage::user("What is Rust?"), ChatMessage::assistant("A language.")],
        );
        recorder.record("thanks", &[ChatMessage::user("thanks")]);

        let store = recorder.store.as_ref().unwrap();
        let chat_id = recorder.chat_id.unwrap();
        let chats = store.list_chats().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "What is Rust?");

        let saved = store.load_messages(chat_id).unwrap();
        assert_eq!(saved.len(), 4);
        assert_eq!(saved[0].role, Role::System);
        assert_eq!(saved[3], ChatMessage::user("thanks"));
    }

    #[test]
    fn test_provider_override() {
        let settings = AppSettings::default();
        let overridden = with_provider(&settings, Some(ProviderKind::OpenAI));
        assert_eq!(overridden.provider, ProviderKind::OpenAI);
        assert_eq!(overridden.default_model(), "gpt-4o-mini");
        assert_eq!(with_provider(&settings, None).provider, ProviderKind::Ollama);
    }
}
