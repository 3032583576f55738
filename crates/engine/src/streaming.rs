//! The tool-calling completion loop, incremental mode.
//!
//! Built on `futures::stream::unfold` over a small phase machine:
//!
//! ```text
//! StartTurn -> Streaming -> (tool calls?) -> ExecutingTools -> StartTurn
//!                        \-> (no calls)   -> Done
//! ```
//!
//! Content fragments surface as chunks as soon as they arrive. Tool-call
//! fragments are only accumulated. A finish fragment surfaces as an
//! empty-delta chunk and ends the turn.

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use personax_core::completion::{CompletionChunk, CompletionDelta, FinishReason};
use personax_core::error::{Error, ProviderError, Result};
use personax_core::message::{Ledger, Message, ToolCallRequest};
use personax_core::provider::{ProviderFragment, Usage};
use personax_core::stream::LazyStream;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::accumulator::{ToolCallAccumulator, assign_call_ids};
use crate::dispatch::run_tool_calls;
use crate::engine::{CompletionEngine, CompletionRequest};

/// An incremental completion in progress.
///
/// `chunks` is lazy: no provider request is made until it is iterated. Once
/// the loop ends the ledger it built is handed back: [`StreamingCompletion::finish`]
/// returns it on success and on failure, while
/// [`StreamingCompletion::into_ledger`] only returns it on success.
#[derive(Debug)]
pub struct StreamingCompletion {
    pub chunks: LazyStream<CompletionChunk>,
    ledger: oneshot::Receiver<Ledger>,
}

impl StreamingCompletion {
    /// Drive the stream to its end and return the ledger it built.
    ///
    /// Fails with the stream's error if the loop did not finish cleanly. Use
    /// [`StreamingCompletion::finish`] to keep the ledger in that case.
    pub async fn into_ledger(self) -> Result<Ledger> {
        match self.finish().await {
            (ledger, None) => Ok(ledger),
            (_, Some(error)) => Err(error),
        }
    }

    /// Drive the stream to its end and return the ledger together with the
    /// error that stopped it, if any.
    ///
    /// On failure the ledger holds every turn and tool result recorded before
    /// the error. The interrupted turn itself is not in it.
    pub async fn finish(self) -> (Ledger, Option<Error>) {
        let error = self.chunks.all().await.err();
        match self.ledger.await {
            Ok(ledger) => (ledger, error),
            Err(_) => (
                Ledger::default(),
                Some(error.unwrap_or_else(|| {
                    Error::Internal("stream finished without handing back its ledger".into())
                })),
            ),
        }
    }
}

struct TurnState {
    fragments: ReceiverStream<std::result::Result<ProviderFragment, ProviderError>>,
    id: String,
    model: String,
    created: i64,
    text: String,
    calls: ToolCallAccumulator,
}

enum Phase {
    StartTurn,
    Streaming(TurnState),
    ExecutingTools(Vec<ToolCallRequest>),
    Done,
}

struct Driver {
    engine: CompletionEngine,
    request: CompletionRequest,
    ledger: Ledger,
    iteration: u32,
    phase: Phase,
    pending: VecDeque<CompletionChunk>,
    ledger_tx: Option<oneshot::Sender<Ledger>>,
}

impl Driver {
    async fn advance(mut self) -> Option<(Result<CompletionChunk>, Self)> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some((Ok(chunk), self));
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::StartTurn => {
                    if self.iteration >= self.engine.max_iterations {
                        warn!(limit = self.engine.max_iterations, "Tool-calling loop hit the iteration cap");
                        let limit = self.engine.max_iterations;
                        return self.fail(Error::IterationLimit { limit });
                    }
                    self.iteration += 1;

                    let request = self.engine.provider_request(&self.ledger, &self.request, true);
                    debug!(
                        iteration = self.iteration,
                        messages = request.messages.len(),
                        "Requesting streamed model turn"
                    );
                    match self.engine.provider.stream(request).await {
                        Ok(rx) => {
                            self.phase = Phase::Streaming(TurnState {
                                fragments: ReceiverStream::new(rx),
                                id: String::new(),
                                model: String::new(),
                                created: Utc::now().timestamp(),
                                text: String::new(),
                                calls: ToolCallAccumulator::new(),
                            });
                        }
                        Err(e) => return self.fail(e.into()),
                    }
                }
                Phase::Streaming(mut turn) => match turn.fragments.next().await {
                    Some(Ok(fragment)) => {
                        if self.absorb(&mut turn, fragment) {
                            self.end_turn(turn);
                        } else {
                            self.phase = Phase::Streaming(turn);
                        }
                    }
                    Some(Err(e)) => return self.fail(e.into()),
                    None => self.end_turn(turn),
                },
                Phase::ExecutingTools(calls) => {
                    debug!(iteration = self.iteration, count = calls.len(), "Executing tool calls");
                    if let Err(e) =
                        run_tool_calls(&mut self.ledger, &self.request.tools, calls, self.engine.tool_concurrency)
                            .await
                    {
                        return self.fail(e);
                    }
                    self.phase = Phase::StartTurn;
                }
                Phase::Done => {
                    info!(iterations = self.iteration, "Streamed completion finished");
                    self.close();
                    return None;
                }
            }
        }
    }

    /// Fold one fragment into the turn. Returns true on a finish fragment.
    fn absorb(&mut self, turn: &mut TurnState, fragment: ProviderFragment) -> bool {
        if !fragment.id.is_empty() {
            turn.id = fragment.id;
        }
        if !fragment.model.is_empty() {
            turn.model = fragment.model;
        }
        if let Some(created) = fragment.created {
            turn.created = created;
        }
        for delta in &fragment.tool_call_deltas {
            turn.calls.push(delta);
        }

        if let Some(text) = fragment.content_delta.filter(|t| !t.is_empty()) {
            turn.text.push_str(&text);
            let chunk = self.chunk(turn, Some(text), None, None);
            self.pending.push_back(chunk);
        }

        match fragment.finish_reason {
            Some(raw) => {
                let reason = FinishReason::normalize(Some(&raw));
                let chunk = self.chunk(turn, None, Some(reason), fragment.usage);
                self.pending.push_back(chunk);
                true
            }
            None => false,
        }
    }

    fn chunk(
        &self,
        turn: &TurnState,
        content: Option<String>,
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
    ) -> CompletionChunk {
        CompletionChunk {
            id: self.request.completion_id.clone().unwrap_or_else(|| turn.id.clone()),
            delta: CompletionDelta { content },
            finish_reason,
            created: turn.created,
            model: if turn.model.is_empty() {
                self.request.model.clone()
            } else {
                turn.model.clone()
            },
            usage,
        }
    }

    /// Record the finished turn and pick the next phase. Dropping the
    /// fragment receiver here ends the provider's sub-stream.
    fn end_turn(&mut self, turn: TurnState) {
        let TurnState { text, calls, .. } = turn;
        let mut calls = calls.finish();
        debug!(
            iteration = self.iteration,
            text_len = text.len(),
            tool_calls = calls.len(),
            "Streamed turn ended"
        );
        self.ledger.push_message(Message::assistant(text));

        if calls.is_empty() {
            self.phase = Phase::Done;
        } else {
            assign_call_ids(&self.ledger, &mut calls);
            self.phase = Phase::ExecutingTools(calls);
        }
    }

    fn fail(mut self, error: Error) -> Option<(Result<CompletionChunk>, Self)> {
        warn!(iteration = self.iteration, error = %error, "Streamed completion failed");
        self.phase = Phase::Done;
        self.close();
        Some((Err(error), self))
    }

    fn close(&mut self) {
        if let Some(tx) = self.ledger_tx.take() {
            let _ = tx.send(std::mem::take(&mut self.ledger));
        }
    }
}

impl CompletionEngine {
    /// Start an incremental completion over `ledger`.
    pub fn complete_stream(&self, ledger: Ledger, request: CompletionRequest) -> StreamingCompletion {
        let (tx, rx) = oneshot::channel();
        let driver = Driver {
            engine: self.clone(),
            request,
            ledger,
            iteration: 0,
            phase: Phase::StartTurn,
            pending: VecDeque::new(),
            ledger_tx: Some(tx),
        };
        StreamingCompletion {
            chunks: LazyStream::new(stream::unfold(driver, Driver::advance)),
            ledger: rx,
        }
    }
}
