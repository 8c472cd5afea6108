//! Core chat session management.
//!
//! [`ChatSession`] owns one side of a conversation: it appends the user's
//! message to the transcript, asks the [`ChatService`] for a response, renders
//! it and appends the answer. Streamed responses go through a
//! [`StreamAccumulator`], which separates reasoning from answer text.

use std::time::Instant;

use futures::StreamExt;

use crate::client::ChatService;
use crate::config::{ConfigRecord, is_reasoning_model};
use crate::error::Result;
use crate::observability::{TURN_DURATION, TURNS};
use crate::render::Renderer;
use crate::transcript::TranscriptStore;
use crate::types::{ChatRequest, ChunkDelta, Message};

/// Where a streamed response is, relative to its two text channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No fragment has arrived yet.
    AwaitingReasoning,
    /// Reasoning fragments are arriving.
    Reasoning,
    /// Reasoning stopped; the answer has not started.
    AwaitingAnswer,
    /// Answer fragments are arriving.
    Answering,
    /// The stream ended.
    Done,
}

/// Accumulates the fragments of one streamed response and drives the renderer.
///
/// The first answer fragment moves the stream through
/// [`StreamState::AwaitingAnswer`], which prints the reasoning-finished marker
/// once when the model is a reasoning model or reasoning text was seen.
#[derive(Debug)]
pub struct StreamAccumulator {
    reasoning_model: bool,
    state: StreamState,
    history: Vec<StreamState>,
    reasoning: String,
    answer: String,
    marker_shown: bool,
    chunks: usize,
}

impl StreamAccumulator {
    /// `reasoning_model` forces the reasoning-finished marker even when the
    /// model sends no reasoning text.
    pub fn new(reasoning_model: bool) -> Self {
        Self {
            reasoning_model,
            state: StreamState::AwaitingReasoning,
            history: vec![StreamState::AwaitingReasoning],
            reasoning: String::new(),
            answer: String::new(),
            marker_shown: false,
            chunks: 0,
        }
    }

    /// The current state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[StreamState] {
        &self.history
    }

    /// Counts a chunk that carried no choice at all.
    pub fn skip(&mut self) {
        self.chunks += 1;
    }

    /// Consumes one chunk's fragments. Reasoning is handled before the answer.
    pub fn push(&mut self, delta: &ChunkDelta, renderer: &mut dyn Renderer) {
        self.chunks += 1;
        let reasoning = delta.reasoning();

        if let Some(text) = reasoning {
            if self.reasoning.is_empty() {
                renderer.start_reasoning();
            }
            self.reasoning.push_str(text);
            renderer.print_reasoning(text);
            self.enter(StreamState::Reasoning);
        }

        match delta.answer() {
            Some(text) => {
                if self.state != StreamState::Answering {
                    self.await_answer(renderer);
                }
                self.answer.push_str(text);
                renderer.print_answer(text);
                self.enter(StreamState::Answering);
            }
            None if reasoning.is_none() && self.state == StreamState::Reasoning => {
                self.await_answer(renderer);
            }
            None => {}
        }
    }

    /// Ends the response.
    pub fn finish(mut self, renderer: &mut dyn Renderer) -> TurnOutcome {
        renderer.finish_response();
        self.enter(StreamState::Done);
        TurnOutcome {
            answer: self.answer,
            reasoning: self.reasoning,
            chunks: self.chunks,
        }
    }

    fn await_answer(&mut self, renderer: &mut dyn Renderer) {
        if !self.marker_shown && (self.reasoning_model || !self.reasoning.is_empty()) {
            renderer.finish_reasoning();
            self.marker_shown = true;
        }
        self.enter(StreamState::AwaitingAnswer);
    }

    fn enter(&mut self, state: StreamState) {
        if self.state != state {
            self.state = state;
            self.history.push(state);
        }
    }
}

/// The result of one completed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The answer text, as appended to the transcript.
    pub answer: String,
    /// The reasoning text; shown, never persisted.
    pub reasoning: String,
    /// Chunks consumed; zero for a non-streamed response.
    pub chunks: usize,
}

/// A chat session that sends user messages and records the answers.
pub struct ChatSession<S: ChatService> {
    service: S,
    model: String,
    temperature: f64,
    stream: bool,
    transcript: TranscriptStore,
}

impl<S: ChatService> ChatSession<S> {
    /// Creates a session using the model, temperature and streaming mode of `config`.
    pub fn new(service: S, config: &ConfigRecord, transcript: TranscriptStore) -> Self {
        Self {
            service,
            model: config.model.clone(),
            temperature: config.temperature,
            stream: config.stream,
            transcript,
        }
    }

    /// Sends `input` as a user message and renders the response.
    ///
    /// The user message is appended before the request is issued and stays in
    /// the transcript if the request fails. The assistant message is appended
    /// only once the whole response has arrived.
    pub async fn send(&mut self, input: &str, renderer: &mut dyn Renderer) -> Result<TurnOutcome> {
        TURNS.click();
        let start = Instant::now();
        self.transcript.append(Message::user(input));
        let request = ChatRequest::new(
            self.model.clone(),
            self.transcript.messages(),
            self.temperature,
        );

        let outcome = if self.stream {
            self.stream_turn(request, renderer).await?
        } else {
            let completion = self.service.complete(request).await?;
            let answer = completion.answer().to_string();
            renderer.print_complete(&answer);
            TurnOutcome {
                answer,
                reasoning: completion.reasoning().unwrap_or_default().to_string(),
                chunks: 0,
            }
        };

        self.transcript
            .append(Message::assistant(outcome.answer.clone()));
        TURN_DURATION.add(start.elapsed().as_secs_f64());
        Ok(outcome)
    }

    async fn stream_turn(
        &self,
        request: ChatRequest,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome> {
        let mut chunks = self.service.stream(request).await?;
        renderer.start_response();
        let mut accumulator = StreamAccumulator::new(is_reasoning_model(&self.model));
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            match chunk.delta() {
                Some(delta) => accumulator.push(delta, renderer),
                None => accumulator.skip(),
            }
        }
        Ok(accumulator.finish(renderer))
    }
}
