use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Body of a `POST /chat/completions` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The model that will complete the conversation.
    pub model: String,

    /// The conversation so far, oldest first.
    pub messages: Vec<Message>,

    /// Sampling temperature.
    pub temperature: f64,

    /// Whether the response is streamed as server-sent events.
    pub stream: bool,
}

impl ChatRequest {
    /// Create a new request.
    pub fn new(model: impl Into<String>, messages: Vec<Message>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            stream: false,
        }
    }

    /// Set whether the response is streamed.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}
