//! SQLite-backed chat history.
//!
//! One row per chat in `chats`, one row per message in `messages`, loaded back
//! in the order they were written.

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use shared::agent_api::{ChatMessage, Role};
use std::path::Path;
use tracing::debug;

const TITLE_MAX_CHARS: usize = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Open (or create) the history database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id);",
        )?;
        Ok(())
    }

    /// Start a new chat and return its id.
    pub fn create_chat(&self, title: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chats (title, created_at) VALUES (?1, ?2)",
            params![title, Utc::now().timestamp()],
        )?;
        let id = conn.last_insert_rowid();
        debug!(chat_id = id, title, "created chat");
        Ok(id)
    }

    /// All chats, newest first.
    pub fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.title, c.created_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.chat_id = c.id)
             FROM chats c
             ORDER BY c.created_at DESC, c.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut chats = Vec::new();
        for row in rows {
            let (id, title, created_at, count) = row?;
            chats.push(ChatSummary {
                id,
                title,
                created_at: Utc
                    .timestamp_opt(created_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                message_count: count as usize,
            });
        }
        Ok(chats)
    }

    pub fn chat_exists(&self, chat_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chats WHERE id = ?1",
            params![chat_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Messages of one chat in the order they were saved.
    pub fn load_messages(&self, chat_id: i64) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT role, content FROM messages WHERE chat_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![chat_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content) = row?;
            let role: Role = role
                .parse()
                .map_err(|e: String| anyhow!("chat {}: {}", chat_id, e))?;
            messages.push(ChatMessage { role, content });
        }
        Ok(messages)
    }

    pub fn save_message(&self, chat_id: i64, message: &ChatMessage) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (chat_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                chat_id,
                message.role.as_str(),
                message.content,
                Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    pub fn delete_chat(&self, chat_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM messages WHERE chat_id = ?1", params![chat_id])?;
        let deleted = conn.execute("DELETE FROM chats WHERE id = ?1", params![chat_id])?;
        Ok(deleted > 0)
    }

    /// Remove every chat and message.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("DELETE FROM messages; DELETE FROM chats;")?;
        Ok(())
    }
}

/// Title for a new chat: the first non-empty line of its first message,
/// shortened to a readable length.
pub fn chat_title_for(first_message: &str) -> String {
    let line = first_message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("New chat");
    if line.chars().count() <= TITLE_MAX_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_messages_load_in_saved_order() {
        let store = HistoryStore::open_in_memory().unwrap();
        let chat = store.create_chat("greeting").unwrap();
        let messages = vec![
            ChatMessage::system("You are a helpful assistant"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("how are you?"),
        ];
        for m in &messages {
            store.save_message(chat, m).unwrap();
        }
        assert_eq!(store.load_messages(chat).unwrap(), messages);
    }

    #[test]
    fn test_list_newest_first_with_counts() {
        let store = HistoryStore::open_in_memory().unwrap();
        let first = store.create_chat("first").unwrap();
        let second = store.create_chat("second").unwrap();
        store.save_message(second, &ChatMessage::user("x")).unwrap();

        let chats = store.list_chats().unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].id, second);
        assert_eq!(chats[0].message_count, 1);
        assert_eq!(chats[1].id, first);
        assert_eq!(chats[1].message_count, 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let store = HistoryStore::open_in_memory().unwrap();
        let a = store.create_chat("a").unwrap();
        let b = store.create_chat("b").unwrap();
        store.save_message(a, &ChatMessage::user("x")).unwrap();

        assert!(store.delete_chat(a).unwrap());
        assert!(!store.delete_chat(a).unwrap());
        assert!(store.load_messages(a).unwrap().is_empty());
        assert!(store.chat_exists(b).unwrap());

        store.clear_all().unwrap();
        assert!(store.list_chats().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("chat_history.db");
        let chat = {
            let store = HistoryStore::open(&path).unwrap();
            let chat = store.create_chat("kept").unwrap();
            store.save_message(chat, &ChatMessage::user("remember me")).unwrap();
            chat
        };

        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(
            store.load_messages(chat).unwrap(),
            vec![ChatMessage::user("remember me")]
        );
    }

    #[test]
    fn test_chat_title() {
        assert_eq!(chat_title_for("\n  What is Rust?\nmore"), "What is Rust?");
        assert_eq!(chat_title_for("   "), "New chat");
        let long = "a".repeat(100);
        assert_eq!(chat_title_for(&long), format!("{}...", "a".repeat(60)));
    }
}
