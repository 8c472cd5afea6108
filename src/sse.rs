//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! Chat completion streams send one `data:` line per event. Each payload is a
//! [`ChatCompletionChunk`] encoded as JSON, and the literal payload `[DONE]`
//! ends the stream.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_BYTES, STREAM_CHUNKS, STREAM_ERRORS};
use crate::{ChatCompletionChunk, Error, Result};

const DONE: &str = "[DONE]";

/// Process a stream of bytes into a stream of completion chunks.
///
/// Bytes are buffered until a full event (terminated by a blank line) is
/// available, so events and multi-byte characters may be split anywhere across
/// network reads. Comment events (lines starting with `:`) are skipped. The
/// stream ends at `[DONE]` or when the connection closes.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, mut done)| async move {
            loop {
                if done {
                    return None;
                }
                if let Some((event, consumed)) = extract_event(&buffer) {
                    buffer.drain(..consumed);
                    match event {
                        Event::Skip => continue,
                        Event::Done => {
                            done = true;
                            continue;
                        }
                        Event::Chunk(chunk) => {
                            if chunk.is_err() {
                                STREAM_ERRORS.click();
                            } else {
                                STREAM_CHUNKS.click();
                            }
                            return Some((chunk, (stream, buffer, done)));
                        }
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // A final event without its blank line still counts.
                        if buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                            buffer.extend_from_slice(b"\n\n");
                            if let Some((Event::Chunk(chunk), _)) = extract_event(&buffer) {
                                return Some((chunk, (stream, Vec::new(), true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

enum Event {
    Skip,
    Done,
    Chunk(Result<ChatCompletionChunk>),
}

/// Find the end of the first event: the index past its blank-line terminator.
fn event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buffer.len() {
        if buffer[i..].starts_with(b"\r\n\r\n") {
            return Some((i, i + 4));
        }
        if buffer[i..].starts_with(b"\n\n") || buffer[i..].starts_with(b"\r\r") {
            return Some((i, i + 2));
        }
        i += 1;
    }
    None
}

/// Extract a complete SSE event from the front of `buffer`.
///
/// Returns the event and the number of bytes it occupied.
fn extract_event(buffer: &[u8]) -> Option<(Event, usize)> {
    let (end, consumed) = event_boundary(buffer)?;
    let event_text = match std::str::from_utf8(&buffer[..end]) {
        Ok(text) => text,
        Err(e) => {
            return Some((
                Event::Chunk(Err(Error::encoding(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                ))),
                consumed,
            ));
        }
    };

    let mut data: Option<String> = None;
    for line in event_text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    let event = match data.as_deref().map(str::trim) {
        None | Some("") => Event::Skip,
        Some(DONE) => Event::Done,
        Some(json) => Event::Chunk(parse_chunk(json)),
    };
    Some((event, consumed))
}

fn parse_chunk(json: &str) -> Result<ChatCompletionChunk> {
    match serde_json::from_str::<ChatCompletionChunk>(json) {
        Ok(chunk) => Ok(chunk),
        Err(e) => {
            if let Some(err) = parse_error_envelope(json) {
                return Err(err);
            }
            Err(Error::serialization(
                format!("Failed to parse chunk JSON: {e}"),
                Some(Box::new(e)),
            ))
        }
    }
}

/// Errors raised mid-stream arrive as `{"error": {...}}` in a data line.
fn parse_error_envelope(json: &str) -> Option<Error> {
    #[derive(Deserialize)]
    struct Envelope {
        error: Detail,
    }

    #[derive(Deserialize)]
    struct Detail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    }

    let envelope: Envelope = serde_json::from_str(json).ok()?;
    Some(Error::api(
        500,
        envelope
            .error
            .error_type
            .or_else(|| Some("stream_error".to_string())),
        envelope.error.message.unwrap_or_else(|| json.to_string()),
    ))
}
