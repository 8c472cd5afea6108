use serde::{Deserialize, Serialize};

use crate::types::{FinishReason, Usage};

/// One server-sent event of a streamed response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    /// Identifier shared by every chunk of a response.
    #[serde(default)]
    pub id: String,

    /// Incremental choices; empty on the trailing usage chunk.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,

    /// Token accounting, reported on the last chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One incremental choice of a [`ChatCompletionChunk`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    /// Index of the choice.
    #[serde(default)]
    pub index: u32,

    /// The fragments carried by this chunk.
    #[serde(default)]
    pub delta: ChunkDelta,

    /// Why generation stopped, on the final chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Text fragments of one chunk.
///
/// A chunk may carry a reasoning fragment, an answer fragment, both or neither.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkDelta {
    /// Answer tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Reasoning tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl ChunkDelta {
    /// The reasoning fragment, if present and non-empty.
    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning_content.as_deref().filter(|s| !s.is_empty())
    }

    /// The answer fragment, if present and non-empty.
    pub fn answer(&self) -> Option<&str> {
        self.content.as_deref().filter(|s| !s.is_empty())
    }
}

impl ChatCompletionChunk {
    /// A chunk carrying the given delta.
    pub fn from_delta(delta: ChunkDelta) -> Self {
        Self {
            id: String::new(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// A chunk carrying only an answer fragment.
    pub fn answer(text: impl Into<String>) -> Self {
        Self::from_delta(ChunkDelta {
            content: Some(text.into()),
            reasoning_content: None,
        })
    }

    /// A chunk carrying only a reasoning fragment.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::from_delta(ChunkDelta {
            content: None,
            reasoning_content: Some(text.into()),
        })
    }

    /// The delta of the first choice, if any.
    pub fn delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|choice| &choice.delta)
    }
}
