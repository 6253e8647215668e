//! Session store - the ordered set of conversations and their logs
//!
//! Single writer: only the session loop mutates it. Presentation layers read
//! cloned snapshots.

use crate::error::{ClientError, Result};
use crate::types::{
    title_from_message, Author, Conversation, TransactionStatus, Turn, DEFAULT_TITLE,
};
use chrono::Utc;

/// In-memory conversation store
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    /// Newest first
    conversations: Vec<Conversation>,
    current: Option<String>,
    loading: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        let id = self.current.as_deref()?;
        self.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("conversation {}", id)))
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Create and select a new conversation
    pub fn create_conversation(&mut self, title: impl Into<String>) -> String {
        let conversation = Conversation::new(title);
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.current = Some(id.clone());
        tracing::debug!(conversation = %id, "Conversation created");
        id
    }

    pub fn select(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(ClientError::NotFound(format!("conversation {}", id)));
        }
        self.current = Some(id.to_string());
        Ok(())
    }

    /// Delete a conversation; clears the selection if it was current
    pub fn delete(&mut self, id: &str) -> Result<Conversation> {
        let index = self
            .conversations
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("conversation {}", id)))?;
        if self.current.as_deref() == Some(id) {
            self.current = None;
        }
        tracing::debug!(conversation = %id, "Conversation deleted");
        Ok(self.conversations.remove(index))
    }

    /// Rename a conversation; blank titles are ignored
    pub fn rename(&mut self, id: &str, title: &str) -> Result<()> {
        let conversation = self.get_mut(id)?;
        let title = title.trim();
        if title.is_empty() {
            return Ok(());
        }
        conversation.title = title.to_string();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    /// Append a user turn, retitling an untouched "New Chat"
    pub fn append_user_turn(&mut self, id: &str, text: &str) -> Result<String> {
        let conversation = self.get_mut(id)?;
        if conversation.turns.is_empty() && conversation.title == DEFAULT_TITLE {
            conversation.title = title_from_message(text);
        }
        let turn = Turn::new(Author::User, text);
        let turn_id = turn.id.clone();
        conversation.turns.push(turn);
        conversation.updated_at = Utc::now();
        Ok(turn_id)
    }

    /// Append a turn to the end of a conversation's log
    pub fn append(&mut self, id: &str, turn: Turn) -> Result<String> {
        let conversation = self.get_mut(id)?;
        let turn_id = turn.id.clone();
        conversation.turns.push(turn);
        conversation.updated_at = Utc::now();
        Ok(turn_id)
    }

    /// Resolve a pending transaction request in place
    ///
    /// Returns `Ok(false)` if the request was already terminal.
    pub fn resolve_transaction(
        &mut self,
        conversation_id: &str,
        turn_id: &str,
        status: TransactionStatus,
        transaction_id: Option<String>,
        error: Option<String>,
    ) -> Result<bool> {
        let conversation = self.get_mut(conversation_id)?;
        let turn = conversation
            .turns
            .iter_mut()
            .find(|t| t.id == turn_id)
            .ok_or_else(|| ClientError::NotFound(format!("turn {}", turn_id)))?;
        let request = turn
            .transaction
            .as_mut()
            .ok_or_else(|| ClientError::NotFound(format!("transaction on turn {}", turn_id)))?;

        let changed = request.resolve(status, transaction_id, error);
        if changed {
            conversation.updated_at = Utc::now();
        }
        Ok(changed)
    }

    pub fn turn_count(&self) -> usize {
        self.conversations.iter().map(|c| c.turns.len()).sum()
    }
}
