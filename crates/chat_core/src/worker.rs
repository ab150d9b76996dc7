//! Background thread that owns a conversation and runs its turns in order.

use crate::controller::{TurnController, TurnResult};
use crate::conversation::Conversation;
use anyhow::{anyhow, Result};
use shared::agent_api::ChatMessage;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Sent back from the worker while a turn runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Progress(String),
    /// The turn is over. `appended` holds every message it added to the
    /// conversation, including a system prompt inserted by the turn.
    Finished {
        result: TurnResult,
        appended: Vec<ChatMessage>,
    },
}

struct TurnRequest {
    model_id: String,
    user_text: String,
}

pub struct ChatWorker {
    requests: Option<Sender<TurnRequest>>,
    events: Receiver<TurnEvent>,
    handle: Option<JoinHandle<Conversation>>,
}

impl ChatWorker {
    pub fn spawn(controller: Arc<TurnController>, conversation: Conversation) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<TurnRequest>();
        let (event_tx, event_rx) = mpsc::channel::<TurnEvent>();

        let handle = thread::Builder::new()
            .name("chat-worker".to_string())
            .spawn(move || run_loop(&controller, conversation, request_rx, event_tx))?;

        Ok(Self {
            requests: Some(request_tx),
            events: event_rx,
            handle: Some(handle),
        })
    }

    /// Queue a turn. Turns run one at a time in submission order.
    pub fn submit(&self, model_id: &str, user_text: &str) -> Result<()> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| anyhow!("chat worker is shut down"))?;
        requests
            .send(TurnRequest {
                model_id: model_id.to_string(),
                user_text: user_text.to_string(),
            })
            .map_err(|_| anyhow!("chat worker has stopped"))
    }

    /// Block for the next event. `None` once the worker has gone away.
    pub fn recv(&self) -> Option<TurnEvent> {
        self.events.recv().ok()
    }

    /// Submit a turn and block until it finishes, forwarding progress.
    pub fn run_turn(
        &self,
        model_id: &str,
        user_text: &str,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<(TurnResult, Vec<ChatMessage>)> {
        self.submit(model_id, user_text)?;
        while let Some(event) = self.recv() {
            match event {
                TurnEvent::Progress(text) => on_progress(&text),
                TurnEvent::Finished { result, appended } => return Ok((result, appended)),
            }
        }
        Err(anyhow!("chat worker stopped during a turn"))
    }

    /// Finish queued turns, stop the thread and hand back the conversation.
    pub fn shutdown(mut self) -> Result<Conversation> {
        self.requests.take();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("chat worker already joined"))?;
        handle
            .join()
            .map_err(|_| anyhow!("chat worker panicked"))
    }
}

fn run_loop(
    controller: &TurnController,
    mut conversation: Conversation,
    requests: Receiver<TurnRequest>,
    events: Sender<TurnEvent>,
) -> Conversation {
    info!("chat worker started");
    for request in requests {
        debug!(model = %request.model_id, "turn received");
        let before = conversation.len();
        let had_system = conversation.system_prompt().is_some();

        let mut on_progress = |text: String| {
            let _ = events.send(TurnEvent::Progress(text));
        };
        let result = controller.execute_turn(
            &mut conversation,
            &request.model_id,
            &request.user_text,
            &mut on_progress,
        );

        let appended = appended_since(&conversation, before, had_system);
        if events.send(TurnEvent::Finished { result, appended }).is_err() {
            error!("event receiver dropped; stopping chat worker");
            break;
        }
    }
    info!(messages = conversation.len(), "chat worker stopped");
    conversation
}

/// Messages a turn added. Turns only append, except for a system prompt
/// inserted at the front.
fn appended_since(conversation: &Conversation, before: usize, had_system: bool) -> Vec<ChatMessage> {
    let messages = conversation.messages();
    let mut appended = Vec::new();
    let mut start = before;
    if !had_system && conversation.system_prompt().is_some() {
        appended.extend(messages.first().cloned());
        start += 1;
    }
    appended.extend(messages.get(start..).unwrap_or_default().iter().cloned());
    appended
}
