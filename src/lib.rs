// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod literal;
pub mod render;
pub mod sse;
pub mod transcript;
pub mod types;
pub mod utils;

mod observability;

// Re-exports
pub use client::{ChatService, ChunkStream, DeepSeek};
pub use client_logger::{ClientLogger, JsonLinesLogger};
pub use config::{ChatHome, ConfigRecord, ConfigStore};
pub use error::{Error, Result};
pub use lifecycle::{ExitTrigger, LifecycleGuard, Shutdown};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use transcript::{SaveOutcome, TranscriptStore};
pub use types::*;
