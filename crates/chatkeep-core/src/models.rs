//! Domain models for conversations, saved items and collections.
//!
//! Field names serialize in camelCase so persisted records keep the layout
//! `{ conversations, activeConversationId }` / `{ savedItems, collections }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title every conversation starts with until one is derived or set.
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Id of the collection that always exists and cannot be deleted.
pub const DEFAULT_COLLECTION_ID: &str = "default";

/// Content recorded when a generation request fails.
pub const ERROR_REPLY: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

/// Generates a fresh unique identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Message roles in a chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Descriptor of a file attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// One turn of a conversation. Never mutated once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_metadata: Option<FileMetadata>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            has_image: false,
            image_url: None,
            has_file: false,
            file_metadata: None,
            is_error: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Synthetic assistant reply recorded after a failed generation.
    pub fn error() -> Self {
        Self {
            is_error: true,
            ..Self::assistant(ERROR_REPLY)
        }
    }

    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.has_image = true;
        self.image_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, metadata: FileMetadata) -> Self {
        self.has_file = true;
        self.file_metadata = Some(metadata);
        self
    }
}

/// An ordered, titled sequence of messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True while the title is still the default sentinel.
    pub fn is_untitled(&self) -> bool {
        self.title == DEFAULT_TITLE
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// A bookmarked snapshot of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedItem {
    pub id: String,
    pub message: Message,
    #[serde(default)]
    pub collection_id: Option<String>,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

/// A named, colored grouping of saved items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub color: String,
}

impl Collection {
    /// The undeletable "All Saved Items" collection.
    pub fn default_collection() -> Self {
        Self {
            id: DEFAULT_COLLECTION_ID.to_string(),
            name: "All Saved Items".to_string(),
            description: "Default collection for all saved items".to_string(),
            created_at: Utc::now(),
            color: "#7C3AED".to_string(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_COLLECTION_ID
    }
}

/// Fields of a collection that may be changed after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl CollectionPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.color.is_none()
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
