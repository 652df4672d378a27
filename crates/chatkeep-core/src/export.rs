//! Read-only export of message sequences.

use chrono::{Local, NaiveDate};

use crate::error::Result;
use crate::models::{Message, MessageRole, SavedItem};

/// Output format for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Json => "json",
        }
    }
}

/// Render messages in `format`.
pub fn render(messages: &[Message], format: ExportFormat, assistant_label: &str) -> Result<String> {
    match format {
        ExportFormat::Text => Ok(render_text(messages, assistant_label)),
        ExportFormat::Json => render_json(messages),
    }
}

/// One block per message: `[time] Speaker:` followed by the content.
pub fn render_text(messages: &[Message], assistant_label: &str) -> String {
    messages
        .iter()
        .map(|msg| {
            let speaker = match msg.role {
                MessageRole::User => "You",
                MessageRole::Assistant => assistant_label,
            };
            let time = msg.timestamp.with_timezone(&Local).format("%H:%M:%S");
            format!("[{time}] {speaker}:\n{}\n", msg.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Messages as a pretty-printed JSON array in the persisted layout.
pub fn render_json(messages: &[Message]) -> Result<String> {
    Ok(serde_json::to_string_pretty(messages)?)
}

/// Saved items as a pretty-printed JSON array, notes and placement included.
pub fn render_saved_json(items: &[&SavedItem]) -> Result<String> {
    Ok(serde_json::to_string_pretty(items)?)
}

/// File name for a saved items export made on `date`.
pub fn saved_export_filename(date: NaiveDate) -> String {
    format!("gemini-saved-items-{}.json", date.format("%Y-%m-%d"))
}

/// File name for an export of `title` made on `date`.
pub fn export_filename(title: &str, format: ExportFormat, date: NaiveDate) -> String {
    let stem: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}_{}.{}", date.format("%Y-%m-%d"), format.extension())
}
