//! Completion value types returned to callers.

use serde::{Deserialize, Serialize};

use crate::provider::Usage;

/// Normalized reason a final turn stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

impl FinishReason {
    /// Map a raw provider reason. Only `length` and `content_filter` survive;
    /// everything else, `tool_calls` and `function_call` included, is `stop`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some("length") => Self::Length,
            Some("content_filter") => Self::ContentFilter,
            _ => Self::Stop,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// The final result of an atomic completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub id: String,
    pub message: CompletionMessage,
    pub finish_reason: FinishReason,
    /// Unix timestamp, seconds.
    pub created: i64,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Partial content of a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One chunk of an incremental completion.
///
/// `finish_reason` is set only on the chunk that ends a model turn, and that
/// chunk carries an empty delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub id: String,
    pub delta: CompletionDelta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    pub created: i64,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    /// Delta text, or "" for finish chunks.
    pub fn text(&self) -> &str {
        self.delta.content.as_deref().unwrap_or_default()
    }

    pub fn is_finish(&self) -> bool {
        self.finish_reason.is_some()
    }
}
