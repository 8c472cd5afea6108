//! Logging trait for chat client operations.
//!
//! This module provides the [`ClientLogger`] trait that captures every API
//! interaction passing through the [`DeepSeek`](crate::DeepSeek) client, and
//! [`JsonLinesLogger`], which appends them to a file as JSON lines.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{ChatCompletion, ChatCompletionChunk, ChatRequest};

/// A trait for logging chat client operations.
///
/// Implementations must not fail: a logger that cannot record an entry drops it.
pub trait ClientLogger: Send + Sync {
    /// Log the body of an outgoing request.
    fn log_request(&self, request: &ChatRequest);

    /// Log a complete response from a non-streaming call.
    fn log_response(&self, completion: &ChatCompletion);

    /// Log one chunk of a streamed response.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Entry<'a> {
    Request { body: &'a ChatRequest },
    Response { body: &'a ChatCompletion },
    Chunk { body: &'a ChatCompletionChunk },
}

/// Appends one JSON object per line to a file.
pub struct JsonLinesLogger {
    file: Mutex<File>,
}

impl JsonLinesLogger {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(format!("failed to open log {}", path.display()), e))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write(&self, entry: &Entry<'_>) {
        let Ok(mut line) = serde_json::to_vec(entry) else {
            return;
        };
        line.push(b'\n');
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(&line);
        }
    }
}

impl ClientLogger for JsonLinesLogger {
    fn log_request(&self, request: &ChatRequest) {
        self.write(&Entry::Request { body: request });
    }

    fn log_response(&self, completion: &ChatCompletion) {
        self.write(&Entry::Response { body: completion });
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        self.write(&Entry::Chunk { body: chunk });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn writes_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.jsonl");
        let logger = JsonLinesLogger::open(&path).unwrap();

        logger.log_request(&ChatRequest::new("deepseek-chat", vec![Message::user("hi")], 0.7));
        logger.log_stream_chunk(&ChatCompletionChunk::answer("he"));
        logger.log_response(&ChatCompletion::from_answer("hello"));

        let text = std::fs::read_to_string(&path).unwrap();
        let kinds: Vec<String> = text
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["kind"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds, vec!["request", "chunk", "response"]);
    }
}
