//! Conversation store: conversations, their messages and the active pointer.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Conversation, DEFAULT_TITLE, Message, MessageRole};
use crate::search;
use crate::storage::{Persisted, StateStorage, StoreState, SubscriptionId};

/// Persisted state of the conversation store.
///
/// `conversations` is ordered most-recently-created first.
/// `active_conversation_id`, when set, names an existing conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    #[serde(default, alias = "chats")]
    pub conversations: Vec<Conversation>,
    #[serde(default, alias = "activeChat")]
    pub active_conversation_id: Option<String>,
}

impl ConversationState {
    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

impl StoreState for ConversationState {
    const KEY: &'static str = "gemini-chat-store";

    fn normalize(&mut self, _version: u32) -> bool {
        match &self.active_conversation_id {
            Some(id) if !self.contains(id) => {
                self.active_conversation_id = None;
                true
            }
            _ => false,
        }
    }
}

/// A message found by [`ConversationStore::search`].
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub conversation: &'a Conversation,
    pub message: &'a Message,
}

/// Owns all conversations. Every mutator writes through to storage before
/// returning; addressing an unknown id is a silent no-op.
pub struct ConversationStore {
    inner: Persisted<ConversationState>,
    title_max_chars: usize,
}

impl ConversationStore {
    /// Rehydrate the store from `storage`.
    pub fn open(storage: Arc<dyn StateStorage>) -> Self {
        Self {
            inner: Persisted::open(storage),
            title_max_chars: 30,
        }
    }

    /// Set how many characters an auto-derived title keeps.
    #[must_use]
    pub fn with_title_max_chars(mut self, max: usize) -> Self {
        self.title_max_chars = max.max(1);
        self
    }

    pub fn state(&self) -> &ConversationState {
        self.inner.state()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.state().conversations
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.state().get(id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.state().active_conversation_id.as_deref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_id().and_then(|id| self.conversation(id))
    }

    /// Create an empty conversation at the front and make it active.
    pub fn create_conversation(&mut self) -> Result<String> {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.inner.update(|state| {
            state.conversations.insert(0, conversation);
            state.active_conversation_id = Some(id.clone());
            Some(())
        })?;
        tracing::debug!(%id, "Created conversation");
        Ok(id)
    }

    /// Return the active conversation id, creating a conversation if none is
    /// active.
    pub fn ensure_active(&mut self) -> Result<String> {
        match self.active_id() {
            Some(id) => Ok(id.to_string()),
            None => self.create_conversation(),
        }
    }

    /// Point the active selection at `id`. Unknown ids are ignored so the
    /// pointer can never dangle.
    pub fn set_active(&mut self, id: &str) -> Result<()> {
        let applied = self.inner.update(|state| {
            if !state.contains(id) {
                return None;
            }
            if state.active_conversation_id.as_deref() == Some(id) {
                return None;
            }
            state.active_conversation_id = Some(id.to_string());
            Some(())
        })?;
        if applied.is_none() && !self.state().contains(id) {
            tracing::debug!(%id, "Ignoring activation of unknown conversation");
        }
        Ok(())
    }

    /// Remove a conversation. If it was active, the first remaining
    /// conversation becomes active, or none if the store is now empty.
    pub fn delete_conversation(&mut self, id: &str) -> Result<()> {
        let applied = self.inner.update(|state| {
            let index = state.conversations.iter().position(|c| c.id == id)?;
            state.conversations.remove(index);
            if state.active_conversation_id.as_deref() == Some(id) {
                state.active_conversation_id =
                    state.conversations.first().map(|c| c.id.clone());
            }
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%id, "Delete of unknown conversation ignored");
        }
        Ok(())
    }

    /// Append a message. The first user message appended while the title is
    /// still the default names the conversation.
    pub fn append_message(&mut self, conversation_id: &str, message: Message) -> Result<()> {
        let title_max_chars = self.title_max_chars;
        let applied = self.inner.update(|state| {
            let conversation = state.get_mut(conversation_id)?;
            if conversation.is_untitled() && message.role == MessageRole::User {
                conversation.title = derive_title(&message.content, title_max_chars);
            }
            conversation.messages.push(message);
            conversation.updated_at = Utc::now();
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%conversation_id, "Append to unknown conversation ignored");
        }
        Ok(())
    }

    /// Append `message` to the active conversation, starting one if none is
    /// active. Returns the conversation id that received it.
    pub fn append_to_active(&mut self, message: Message) -> Result<String> {
        let id = self.ensure_active()?;
        self.append_message(&id, message)?;
        Ok(id)
    }

    /// Set the title verbatim. Use [`validate_title`] first for user input.
    pub fn rename_conversation(&mut self, id: &str, title: impl Into<String>) -> Result<()> {
        let title = title.into();
        let applied = self.inner.update(|state| {
            let conversation = state.get_mut(id)?;
            conversation.title = title;
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%id, "Rename of unknown conversation ignored");
        }
        Ok(())
    }

    /// Messages of a conversation in order; empty if it does not exist.
    pub fn messages(&self, id: &str) -> &[Message] {
        self.conversation(id).map_or(&[], |c| c.messages.as_slice())
    }

    /// Drop every message and restore the default title.
    pub fn clear_messages(&mut self, id: &str) -> Result<()> {
        let applied = self.inner.update(|state| {
            let conversation = state.get_mut(id)?;
            conversation.messages.clear();
            conversation.title = DEFAULT_TITLE.to_string();
            conversation.updated_at = Utc::now();
            Some(())
        })?;
        if applied.is_none() {
            tracing::debug!(%id, "Clear of unknown conversation ignored");
        }
        Ok(())
    }

    /// Case-insensitive substring search across every conversation.
    pub fn search(&self, term: &str) -> Vec<SearchHit<'_>> {
        self.conversations()
            .iter()
            .flat_map(|conversation| {
                search::matching(&conversation.messages, term)
                    .map(move |message| SearchHit {
                        conversation,
                        message,
                    })
            })
            .collect()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&ConversationState) + 'static) -> SubscriptionId {
        self.inner.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }
}

/// Title taken from the first `max_chars` characters of `content`, with an
/// ellipsis when anything was cut.
pub fn derive_title(content: &str, max_chars: usize) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Trim a user-supplied title and check it against `max_chars`.
pub fn validate_title(title: &str, max_chars: usize) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidTitle("title cannot be empty".into()));
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(Error::InvalidTitle(format!(
            "title must be {max_chars} characters or less (got {len})"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
#[path = "conversations_tests.rs"]
mod tests;
