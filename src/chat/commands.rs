//! Classification of lines typed at the `User> ` prompt.

/// Words that end the session, compared case-insensitively.
const QUIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

/// What a line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// End the session through the normal exit path.
    Quit,
    /// Nothing to send.
    Empty,
    /// Send this text to the model, exactly as typed.
    Message(String),
}

/// Classifies one line of user input.
///
/// # Examples
///
/// ```
/// # use dschat::chat::{ChatInput, parse_input};
/// assert_eq!(parse_input("  Quit "), ChatInput::Quit);
/// assert_eq!(parse_input("   "), ChatInput::Empty);
/// assert_eq!(parse_input("hi"), ChatInput::Message("hi".to_string()));
/// ```
pub fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }
    if QUIT_WORDS
        .iter()
        .any(|word| trimmed.eq_ignore_ascii_case(word))
    {
        return ChatInput::Quit;
    }
    ChatInput::Message(line.to_string())
}
