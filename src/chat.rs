//! Assistant chat relay.
//!
//! A chat session is an append-only transcript held in memory and thrown
//! away when the session ends. Each user message is relayed, together with
//! the transcript so far, to the generative-language API through the retry
//! wrapper. Whatever happens remotely, the transcript only ever gains
//! readable text: an empty answer and an exhausted retry budget both become
//! fixed fallback replies.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::data_sources::GenerativeClient;
use crate::data_sources::generative::GenerateContentRequest;
use crate::model::ChatMessage;
use crate::retry::Backoff;

/// First assistant message of every session.
pub const GREETING: &str = "Hello! I am your AI assistant. I can help with general questions about the platform or data management. How can I assist you today?";

/// Instruction sent with every request.
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful and friendly administrative assistant for a user management platform. Keep your answers concise and professional.";

/// Reply used when the API answers without any text.
pub const EMPTY_REPLY: &str = "Sorry, I received an empty response from the AI.";

/// Reply used when every attempt failed.
pub const ERROR_REPLY: &str = "I encountered a network or API error. Please try again later.";

/// One in-memory conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    transcript: Vec<ChatMessage>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            transcript: vec![ChatMessage::assistant(GREETING)],
        }
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }
}

/// Relays user messages to the generative-language API.
#[derive(Clone)]
pub struct ChatRelay {
    client: GenerativeClient,
    backoff: Backoff,
}

impl ChatRelay {
    pub fn new(client: GenerativeClient) -> Self {
        Self::with_backoff(client, Backoff::default())
    }

    pub fn with_backoff(client: GenerativeClient, backoff: Backoff) -> Self {
        Self { client, backoff }
    }

    /// Append `text` to the session, ask the API, append and return the reply.
    ///
    /// Blank input is ignored and returns `None`.
    #[instrument(skip_all, fields(model = %self.client.model()))]
    pub async fn send(&self, session: &mut ChatSession, text: &str) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        session.transcript.push(ChatMessage::user(text));
        let request = GenerateContentRequest::from_transcript(&session.transcript, SYSTEM_INSTRUCTION);

        let reply = match self.backoff.retry(|| self.client.generate(&request)).await {
            Ok(response) => match response.reply_text() {
                Some(reply) => reply.to_string(),
                None => {
                    warn!("Assistant returned no text");
                    EMPTY_REPLY.to_string()
                }
            },
            Err(error) => {
                warn!(
                    error = %error,
                    attempts = self.backoff.max_attempts(),
                    "Assistant request failed"
                );
                ERROR_REPLY.to_string()
            }
        };

        let reply = ChatMessage::assistant(reply);
        session.transcript.push(reply.clone());
        Some(reply)
    }
}

/// Chat sessions keyed by user.
///
/// Each user's session has its own lock, so one user's pending request never
/// holds up another's, while a single user's messages are relayed in order.
#[derive(Clone)]
pub struct ChatDesk {
    relay: ChatRelay,
    sessions: Arc<Mutex<HashMap<String, Arc<Mutex<ChatSession>>>>>,
}

impl ChatDesk {
    pub fn new(relay: ChatRelay) -> Self {
        Self {
            relay,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn session_for(&self, user_id: &str) -> Arc<Mutex<ChatSession>> {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(
            sessions
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ChatSession::new()))),
        )
    }

    /// Current transcript, starting a session if there is none.
    pub async fn transcript(&self, user_id: &str) -> Vec<ChatMessage> {
        let session = self.session_for(user_id).await;
        let session = session.lock().await;
        session.transcript().to_vec()
    }

    /// Relay a message. Returns the reply and the updated transcript, or
    /// `None` for blank input.
    pub async fn send(&self, user_id: &str, text: &str) -> Option<(ChatMessage, Vec<ChatMessage>)> {
        let session = self.session_for(user_id).await;
        let mut session = session.lock().await;
        let reply = self.relay.send(&mut session, text).await?;
        Some((reply, session.transcript().to_vec()))
    }

    /// Discard the user's transcript. Returns whether a session existed.
    ///
    /// A request still in flight finishes against the detached session.
    pub async fn end(&self, user_id: &str) -> bool {
        let ended = self.sessions.lock().await.remove(user_id).is_some();
        debug!(ended, "Chat session ended");
        ended
    }
}
