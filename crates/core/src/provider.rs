//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send wire messages to a model and get a turn
//! back, either whole ([`ProviderTurn`]) or as a channel of
//! [`ProviderFragment`]s. It is a pure transport: it never runs tools and it
//! never retries on behalf of the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::ToolResultContent;
use crate::schema::ToolSchema;

/// Roles on the provider wire. `Tool` exists only here; the ledger models
/// tool traffic as dedicated entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call as carried on an assistant wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
}

/// One message in the provider's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,

    /// `None` for an assistant message that only carries tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ToolResultContent>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,

    /// Set on tool-role messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn text(role: WireRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(ToolResultContent::Text(content.into())),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: ToolResultContent) -> Self {
        Self {
            role: WireRole::Tool,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Optional sampling knobs. Providers forward only the ones that are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

/// Configuration for a provider request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    pub messages: Vec<WireMessage>,

    /// `None` when no tools are offered; the field is then left off the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Prompt-cache routing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,

    #[serde(default)]
    pub sampling: SamplingParams,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            stream: false,
            max_tokens: None,
            cache_key: None,
            sampling: SamplingParams::default(),
            parallel_tool_calls: None,
        }
    }

    /// Offer tools. An empty list clears them.
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        if tools.is_empty() {
            self.tools = None;
            self.parallel_tool_calls = None;
        } else {
            self.tools = Some(tools);
            self.parallel_tool_calls = Some(true);
        }
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) model turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderTurn {
    pub id: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub refusal: Option<String>,

    /// Reasoning text, for models that expose it.
    #[serde(default)]
    pub reasoning: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,

    /// Raw provider finish reason ("stop", "tool_calls", ...).
    #[serde(default)]
    pub finish_reason: Option<String>,

    #[serde(default)]
    pub usage: Option<Usage>,

    /// Unix timestamp reported by the provider, if any.
    #[serde(default)]
    pub created: Option<i64>,
}

/// A partial tool call inside a fragment. Fragments sharing `index` belong to
/// the same call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name_delta: Option<String>,
    #[serde(default)]
    pub arguments_delta: Option<String>,
}

/// One incremental unit of a streamed turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderFragment {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub content_delta: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_deltas: Vec<ToolCallDelta>,

    #[serde(default)]
    pub finish_reason: Option<String>,

    #[serde(default)]
    pub usage: Option<Usage>,

    #[serde(default)]
    pub created: Option<i64>,
}

/// Receiving half of a streamed turn.
pub type FragmentReceiver = tokio::sync::mpsc::Receiver<Result<ProviderFragment, ProviderError>>;

/// The core Provider trait.
///
/// The engine calls `complete()` or `stream()` without knowing which backend
/// is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete turn.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderTurn, ProviderError>;

    /// Send a request and get a channel of fragments.
    ///
    /// Default implementation calls `complete()` and replays the turn as one
    /// content fragment, one tool-call fragment per call and a finish fragment.
    async fn stream(&self, request: ProviderRequest) -> Result<FragmentReceiver, ProviderError> {
        let turn = self.complete(request).await?;
        let fragments = turn_to_fragments(turn);
        let (tx, rx) = tokio::sync::mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            let _ = tx.send(Ok(fragment)).await;
        }
        Ok(rx)
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Split a whole turn into the fragments a streaming backend would send.
pub fn turn_to_fragments(turn: ProviderTurn) -> Vec<ProviderFragment> {
    let base = ProviderFragment {
        id: turn.id,
        model: turn.model,
        created: turn.created,
        ..Default::default()
    };
    let mut out = Vec::new();

    if let Some(content) = turn.content.filter(|c| !c.is_empty()) {
        out.push(ProviderFragment {
            content_delta: Some(content),
            ..base.clone()
        });
    }
    for (index, call) in turn.tool_calls.into_iter().enumerate() {
        out.push(ProviderFragment {
            tool_call_deltas: vec![ToolCallDelta {
                index: index as u32,
                id: Some(call.id),
                name_delta: Some(call.name),
                arguments_delta: Some(call.arguments),
            }],
            ..base.clone()
        });
    }
    out.push(ProviderFragment {
        finish_reason: Some(turn.finish_reason.unwrap_or_else(|| "stop".into())),
        usage: turn.usage,
        ..base
    });
    out
}
