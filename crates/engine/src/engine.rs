//! The tool-calling completion loop, atomic mode.

use chrono::Utc;
use personax_core::completion::{Completion, CompletionMessage, FinishReason};
use personax_core::error::{Error, Result};
use personax_core::message::{Ledger, Message};
use personax_core::provider::{Provider, ProviderRequest, SamplingParams};
use personax_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accumulator::{assign_call_ids, from_wire};
use crate::dispatch::run_tool_calls;
use crate::wire::build_wire_messages;

/// Default cap on model turns per completion call.
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

/// Per-call parameters of a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to request.
    pub model: String,

    /// Tools offered to the model.
    pub tools: Arc<ToolRegistry>,

    pub max_tokens: Option<u32>,

    /// Prompt-cache routing key, forwarded to the provider.
    pub cache_key: Option<String>,

    /// Replaces the provider's id on the result and on every chunk.
    pub completion_id: Option<String>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            tools: Arc::new(ToolRegistry::new()),
            max_tokens: None,
            cache_key: None,
            completion_id: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_completion_id(mut self, id: impl Into<String>) -> Self {
        self.completion_id = Some(id.into());
        self
    }
}

/// Drives a provider through repeated turns until the model stops asking
/// for tools.
#[derive(Clone)]
pub struct CompletionEngine {
    pub(crate) provider: Arc<dyn Provider>,

    /// Maximum model turns per call
    pub(crate) max_iterations: u32,

    /// Maximum tools executing at once within a turn
    pub(crate) tool_concurrency: usize,

    pub(crate) sampling: SamplingParams,
}

impl CompletionEngine {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_concurrency: 1,
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_tool_concurrency(mut self, n: usize) -> Self {
        self.tool_concurrency = n.max(1);
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn tool_concurrency(&self) -> usize {
        self.tool_concurrency
    }

    /// Build the provider request for the current state of the ledger.
    pub(crate) fn provider_request(&self, ledger: &Ledger, req: &CompletionRequest, stream: bool) -> ProviderRequest {
        let mut request =
            ProviderRequest::new(req.model.clone(), build_wire_messages(ledger)).with_tools(req.tools.schemas());
        request.stream = stream;
        request.max_tokens = req.max_tokens;
        request.cache_key = req.cache_key.clone();
        request.sampling = self.sampling;
        request
    }

    /// Run the loop to completion.
    ///
    /// The ledger receives one assistant message per model turn plus one
    /// request/result pair per tool call. On error it keeps whatever was
    /// appended before the failure.
    pub async fn complete(&self, ledger: &mut Ledger, req: &CompletionRequest) -> Result<Completion> {
        for iteration in 1..=self.max_iterations {
            let request = self.provider_request(ledger, req, false);
            debug!(
                iteration,
                messages = request.messages.len(),
                tools = req.tools.len(),
                "Requesting model turn"
            );

            let turn = self.provider.complete(request).await?;
            ledger.push_message(Message::assistant(turn.content.clone().unwrap_or_default()));

            if turn.tool_calls.is_empty() {
                let finish_reason = FinishReason::normalize(turn.finish_reason.as_deref());
                info!(iterations = iteration, finish_reason = %finish_reason, "Completion finished");
                return Ok(Completion {
                    id: req.completion_id.clone().unwrap_or(turn.id),
                    message: CompletionMessage {
                        content: turn.content.unwrap_or_default(),
                        refusal: turn.refusal,
                        reasoning: turn.reasoning,
                    },
                    finish_reason,
                    created: turn.created.unwrap_or_else(|| Utc::now().timestamp()),
                    model: if turn.model.is_empty() { req.model.clone() } else { turn.model },
                    usage: turn.usage,
                });
            }

            let mut calls = from_wire(turn.tool_calls);
            assign_call_ids(ledger, &mut calls);
            debug!(iteration, count = calls.len(), "Executing tool calls");
            run_tool_calls(ledger, &req.tools, calls, self.tool_concurrency).await?;
        }

        warn!(limit = self.max_iterations, "Tool-calling loop hit the iteration cap");
        Err(Error::IterationLimit {
            limit: self.max_iterations,
        })
    }
}

impl std::fmt::Debug for CompletionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionEngine")
            .field("provider", &self.provider.name())
            .field("max_iterations", &self.max_iterations)
            .field("tool_concurrency", &self.tool_concurrency)
            .finish()
    }
}
