use serde::{Deserialize, Serialize};

use crate::types::{FinishReason, Usage};

/// A complete, non-streamed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// Unique identifier for the response.
    #[serde(default)]
    pub id: String,

    /// The model that produced the response.
    #[serde(default)]
    pub model: String,

    /// The generated choices; this client only requests one.
    pub choices: Vec<CompletionChoice>,

    /// Token accounting, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One generated choice of a [`ChatCompletion`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    /// Index of the choice.
    #[serde(default)]
    pub index: u32,

    /// The generated message.
    pub message: CompletionMessage,

    /// Why generation stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// The assistant message of a [`CompletionChoice`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionMessage {
    /// The answer text.
    #[serde(default)]
    pub content: Option<String>,

    /// Reasoning text produced by reasoning models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl ChatCompletion {
    /// Create a completion with a single answer.
    pub fn from_answer(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            model: String::new(),
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    content: Some(content.into()),
                    reasoning_content: None,
                },
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: None,
        }
    }

    /// The answer text of the first choice, or the empty string.
    pub fn answer(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or_default()
    }

    /// The reasoning text of the first choice, if any.
    pub fn reasoning(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.reasoning_content.as_deref())
            .filter(|text| !text.is_empty())
    }
}
