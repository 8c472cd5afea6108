// Public modules
pub mod chat_completion;
pub mod chat_completion_chunk;
pub mod chat_request;
pub mod finish_reason;
pub mod message;
pub mod usage;

// Re-exports
pub use chat_completion::{ChatCompletion, CompletionChoice, CompletionMessage};
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_request::ChatRequest;
pub use finish_reason::FinishReason;
pub use message::{Message, Role};
pub use usage::Usage;
