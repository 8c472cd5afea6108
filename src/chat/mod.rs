//! The interactive chat application.
//!
//! - [`args`]: command-line parsing and per-run configuration overrides
//! - [`commands`]: classification of lines typed at the prompt
//! - [`session`]: one turn of conversation, streamed or not
//! - [`startup`]: `--key`, configuration and transcript loading, `--new` and `--status`

mod args;
mod commands;
mod session;
mod startup;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use args::ChatArgs;
pub use commands::{ChatInput, parse_input};
pub use session::{ChatSession, StreamAccumulator, StreamState, TurnOutcome};
pub use startup::{NextStep, Prepared, Startup, prepare};
