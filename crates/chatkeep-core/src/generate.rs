//! Generation capability consumed by the chat view.
//!
//! The stores never call a [`Generator`]. [`complete_turn`] records the user
//! message, awaits the generator, then records the outcome as a second
//! message. A failed generation becomes an error-flagged assistant message.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::conversations::ConversationStore;
use crate::error::Result;
use crate::models::{FileMetadata, Message};

/// Binary payload sent along with a prompt.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            name: self.name.clone(),
            size: self.data.len() as u64,
            mime_type: self.mime_type.clone(),
        }
    }

    /// Inline `data:` URL of the payload, as recorded on image messages.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }

    /// Prompt used when the user attached something without asking anything.
    pub fn default_prompt(&self) -> &'static str {
        if self.is_image() {
            "Describe this image in detail"
        } else if self.is_video() {
            "Describe this video in detail"
        } else {
            "Summarize this file in detail"
        }
    }
}

/// Everything a backend needs to produce one reply.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Prior turns, error replies excluded.
    pub history: Vec<Message>,
    pub prompt: String,
    pub attachment: Option<Attachment>,
    pub model: String,
}

impl GenerationRequest {
    pub fn new(history: &[Message], prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            history: history.iter().filter(|m| !m.is_error).cloned().collect(),
            prompt: prompt.into(),
            attachment: None,
            model: model.into(),
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        if self.prompt.trim().is_empty() {
            self.prompt = attachment.default_prompt().to_string();
        }
        self.attachment = Some(attachment);
        self
    }
}

/// A text generation backend.
pub trait Generator {
    fn generate(&self, request: &GenerationRequest) -> impl Future<Output = Result<String>>;
}

/// Run one chat turn against `conversation_id` and return the recorded
/// reply. Only persistence failures are returned as errors.
pub async fn complete_turn<G: Generator>(
    store: &mut ConversationStore,
    generator: &G,
    conversation_id: &str,
    prompt: &str,
    attachment: Option<Attachment>,
    model: &str,
) -> Result<Message> {
    let history = store.messages(conversation_id).to_vec();

    let mut user_message = Message::user(prompt);
    if let Some(attachment) = &attachment {
        user_message = if attachment.is_image() {
            user_message.with_image(attachment.data_url())
        } else {
            user_message.with_file(attachment.metadata())
        };
    }
    store.append_message(conversation_id, user_message)?;

    let mut request = GenerationRequest::new(&history, prompt, model);
    if let Some(attachment) = attachment {
        request = request.with_attachment(attachment);
    }

    let reply = match generator.generate(&request).await {
        Ok(text) => Message::assistant(text),
        Err(err) => {
            tracing::warn!(%conversation_id, model, "Generation failed: {err}");
            Message::error()
        }
    };
    store.append_message(conversation_id, reply.clone())?;
    Ok(reply)
}
