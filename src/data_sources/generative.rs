//! Generative-language API client used by the assistant chat.
//!
//! One call per user message: the whole transcript is sent as `contents`
//! together with a fixed system instruction, and the first candidate's first
//! text part is the reply.
//!
//! # API Reference
//!
//! See: <https://ai.google.dev/api/generate-content>

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::model::ChatMessage;

/// Base URL for the generative-language API.
pub const GENERATIVE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

/// Client for `models/{model}:generateContent`.
#[derive(Clone)]
pub struct GenerativeClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GenerativeClient {
    /// Create a client for the default model.
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(GENERATIVE_API_BASE, DEFAULT_MODEL, api_key)
    }

    /// Create a client with a custom base URL and model.
    pub fn with_base_url(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            urlencoding::encode(&self.model),
            urlencoding::encode(&self.api_key)
        )
    }

    /// Send one generation request. A non-success status is an error.
    pub async fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, RemoteError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status { status });
        }

        let body = response.json::<GenerateContentResponse>().await?;
        Ok(body)
    }
}

/// Request body of `generateContent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub system_instruction: Content,
}

impl GenerateContentRequest {
    /// Build a request from a chat transcript.
    pub fn from_transcript(transcript: &[ChatMessage], system_instruction: &str) -> Self {
        Self {
            contents: transcript
                .iter()
                .map(|message| Content {
                    role: Some(message.role.wire_name().to_string()),
                    parts: vec![Part {
                        text: Some(message.text.clone()),
                    }],
                })
                .collect(),
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(system_instruction.to_string()),
                }],
            },
        }
    }
}

/// A turn of content: a role and its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Response body of `generateContent`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// Text at `candidates[0].content.parts[0].text`, if present and non-empty.
    pub fn reply_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
            .filter(|text| !text.is_empty())
    }
}
