//! Gemini backend for the generation capability, using the generateContent API.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chatkeep_core::config::GenerationConfig;
use chatkeep_core::generate::{GenerationRequest, Generator};
use chatkeep_core::models::MessageRole;
use chatkeep_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        Ok(Self::new(config.api_key()?, config.base_url.clone()))
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        ..Part::default()
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "model",
    }
}

/// Attachment requests carry only the prompt and the payload; chat requests
/// carry the history followed by the prompt.
fn build_contents(request: &GenerationRequest) -> Vec<Content> {
    if let Some(attachment) = &request.attachment {
        return vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                text_part(&request.prompt),
                Part {
                    inline_data: Some(InlineData {
                        mime_type: attachment.mime_type.clone(),
                        data: BASE64.encode(&attachment.data),
                    }),
                    ..Part::default()
                },
            ],
        }];
    }

    let mut contents: Vec<Content> = request
        .history
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| Content {
            role: Some(role_name(m.role).to_string()),
            parts: vec![text_part(&m.content)],
        })
        .collect();
    contents.push(Content {
        role: Some("user".to_string()),
        parts: vec![text_part(&request.prompt)],
    });
    contents
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Error::Generation("Gemini returned no text".into()));
    }
    Ok(text)
}

impl Generator for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateContentRequest {
            contents: build_contents(request),
        };
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);

        tracing::debug!(model = %request.model, turns = body.contents.len(), "Calling Gemini");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".into());
            return Err(Error::Generation(format!("Gemini API error {status}: {body}")));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;
        extract_text(parsed)
    }
}
