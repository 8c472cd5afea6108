//! Interactive terminal chat with DeepSeek models.
//!
//! # Usage
//!
//! ```bash
//! # First run: write a configuration
//! dschat --key sk-...
//!
//! # Chat with the configured model
//! dschat
//!
//! # Use the reasoning model and keep the conversation across runs
//! dschat -r -m
//!
//! # Archive the current conversation and start over
//! dschat --new
//! ```
//!
//! Type `exit`, `quit` or `q` (or press Ctrl-D) to leave. The conversation is
//! saved on the way out when memory is enabled.

use std::env;
use std::io;
use std::process;
use std::sync::Arc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use dschat::chat::{
    ChatArgs, ChatInput, ChatSession, NextStep, PlainTextRenderer, Prepared, Startup, parse_input,
    prepare,
};
use dschat::lifecycle::print_error_chain;
use dschat::{ChatHome, ConfigRecord, DeepSeek, Error, JsonLinesLogger, LifecycleGuard};

/// Prompt shown before each line of input.
const PROMPT: &str = "User> ";

/// When set, every request, response and chunk is appended to this file.
const LOG_ENV: &str = "DSCHAT_LOG";

/// Exit status for command-line usage errors.
const USAGE_EXIT: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let program = env::args().next().unwrap_or_else(|| "dschat".to_string());
    let args = match ChatArgs::parse(env::args_os().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            eprint!("{}", ChatArgs::usage(&program));
            process::exit(USAGE_EXIT);
        }
    };
    if args.help {
        print!("{}", ChatArgs::usage(&program));
        return;
    }

    let home = ChatHome::from_env().unwrap_or_else(|err| fatal(&err));
    // A corrupt transcript stops us before the guard exists, so it is never overwritten.
    let prepared = match prepare(&args, &home) {
        Ok(Startup::Ready(prepared)) => prepared,
        Ok(Startup::ConfigCreated(_)) => return,
        Err(err) => fatal(&err),
    };
    let guard =
        LifecycleGuard::install(prepared.transcript.clone()).unwrap_or_else(|err| fatal(&err));

    let mut renderer = PlainTextRenderer::new();
    match prepared.run_actions(&args, &mut renderer) {
        Ok(NextStep::Chat) => {}
        Ok(NextStep::Exit) => guard.exit(),
        Err(err) => guard.fail(&err),
    }
    let Prepared { config, transcript } = prepared;

    let client = match build_client(&config) {
        Ok(client) => client,
        Err(err) => guard.fail(&err),
    };
    let mut session = ChatSession::new(client, &config, transcript);
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => guard.fail(&readline_error(err)),
    };

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => match parse_input(&line) {
                ChatInput::Empty => continue,
                ChatInput::Quit => break,
                ChatInput::Message(text) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if let Err(err) = session.send(&text, &mut renderer).await {
                        if err.is_connection() || err.is_timeout() {
                            eprintln!("Could not reach {}", config.base_url);
                        }
                        guard.fail(&err);
                    }
                }
            },
            Err(ReadlineError::Interrupted) => guard.interrupt(),
            Err(ReadlineError::Eof) => break,
            Err(err) => guard.fail(&readline_error(err)),
        }
    }

    guard.exit()
}

fn build_client(config: &ConfigRecord) -> Result<DeepSeek, Error> {
    let client = DeepSeek::new(config.api_key.clone(), config.base_url.clone())?;
    match env::var_os(LOG_ENV).filter(|path| !path.is_empty()) {
        Some(path) => Ok(client.with_logger(Arc::new(JsonLinesLogger::open(path)?))),
        None => Ok(client),
    }
}

fn readline_error(err: ReadlineError) -> Error {
    Error::io("failed to read input", io::Error::other(err.to_string()))
}

/// Reports an error that happened before the lifecycle guard was installed.
fn fatal(err: &Error) -> ! {
    print_error_chain(err, &mut io::stderr());
    process::exit(1)
}
