use shared::agent_api::{ChatMessage, Role};
use shared::settings::DEFAULT_SYSTEM_PROMPT;

/// Ordered message log of one chat.
///
/// Holds at most one system message, always at index 0. Turns only ever
/// append; earlier messages are never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Start a conversation seeded with `system_prompt`, or the default prompt.
    pub fn new(system_prompt: Option<&str>) -> Self {
        let prompt = system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT);
        Self {
            messages: vec![ChatMessage::system(prompt)],
        }
    }

    /// Rebuild a conversation from persisted messages.
    ///
    /// The first system message found is moved to the front and any later ones
    /// are dropped. A history without one is kept as-is; call
    /// [`Conversation::ensure_system_prompt`] to repair it.
    pub fn from_history(history: Vec<ChatMessage>) -> Self {
        let mut system = None;
        let mut rest = Vec::with_capacity(history.len());
        for message in history {
            if message.role == Role::System {
                if system.is_none() {
                    system = Some(message);
                }
            } else {
                rest.push(message);
            }
        }
        let mut messages = Vec::with_capacity(rest.len() + 1);
        messages.extend(system);
        messages.extend(rest);
        Self { messages }
    }

    /// Insert `default` as the first message when there is no system message.
    /// Returns whether one was inserted.
    pub fn ensure_system_prompt(&mut self, default: &str) -> bool {
        if self.system_prompt().is_some() {
            return false;
        }
        self.messages.insert(0, ChatMessage::system(default));
        true
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::user(text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(text));
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop messages added after `len`. Only used to undo the current turn.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_count(conversation: &Conversation) -> usize {
        conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .count()
    }

    #[test]
    fn test_new_uses_default_prompt() {
        let conversation = Conversation::new(None);
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.system_prompt(), Some("You are a helpful assistant"));

        let custom = Conversation::new(Some("Be terse."));
        assert_eq!(custom.system_prompt(), Some("Be terse."));
    }

    #[test]
    fn test_ensure_inserts_once_at_front() {
        let mut conversation = Conversation::from_history(vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        assert_eq!(conversation.system_prompt(), None);

        assert!(conversation.ensure_system_prompt("default"));
        assert!(!conversation.ensure_system_prompt("other"));

        assert_eq!(system_count(&conversation), 1);
        assert_eq!(conversation.messages()[0], ChatMessage::system("default"));
        assert_eq!(conversation.messages()[1], ChatMessage::user("hi"));
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn test_from_history_normalizes_system_messages() {
        let conversation = Conversation::from_history(vec![
            ChatMessage::user("hi"),
            ChatMessage::system("first"),
            ChatMessage::assistant("hello"),
            ChatMessage::system("second"),
        ]);
        assert_eq!(system_count(&conversation), 1);
        assert_eq!(conversation.system_prompt(), Some("first"));
        assert_eq!(
            conversation.messages()[1..],
            [ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
    }

    #[test]
    fn test_appends_keep_order() {
        let mut conversation = Conversation::default();
        conversation.append_user("one");
        conversation.append_assistant("two");
        assert_eq!(conversation.last(), Some(&ChatMessage::assistant("two")));
        assert_eq!(conversation.len(), 3);

        conversation.truncate(2);
        assert_eq!(conversation.last(), Some(&ChatMessage::user("one")));
    }
}
