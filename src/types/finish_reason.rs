use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons why the model stopped generating a response.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model reached a natural stopping point.
    Stop,

    /// The response reached the maximum token limit.
    Length,

    /// Output was withheld by the content filter.
    ContentFilter,

    /// The model asked to call a tool.
    ToolCalls,

    /// The request was interrupted because the service ran out of resources.
    InsufficientSystemResource,

    /// A reason this client does not know about.
    #[serde(other)]
    Other,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::Length => write!(f, "length"),
            FinishReason::ContentFilter => write!(f, "content_filter"),
            FinishReason::ToolCalls => write!(f, "tool_calls"),
            FinishReason::InsufficientSystemResource => write!(f, "insufficient_system_resource"),
            FinishReason::Other => write!(f, "other"),
        }
    }
}
