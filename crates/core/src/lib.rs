//! # PersonaX Core
//!
//! Domain types, traits, and error definitions for the PersonaX conversation
//! engine. Every other crate depends inward on this one.
//!
//! - [`message`]: the conversation ledger and message structure rules
//! - [`schema`] and [`tool`]: the tool contract and its JSON-Schema derivation
//! - [`provider`]: the LLM transport boundary
//! - [`completion`]: values returned to callers
//! - [`stream`]: the lazy, replayable async stream

pub mod completion;
pub mod error;
pub mod message;
pub mod provider;
pub mod schema;
pub mod stream;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use completion::{Completion, CompletionChunk, CompletionDelta, CompletionMessage, FinishReason};
pub use error::{Error, LedgerError, ProviderError, RegistryError, ResourceError, Result, ToolError};
pub use message::{
    Ledger, LedgerEntry, Message, MessageRules, Role, ToolCallRequest, ToolCallResult, ToolResultContent,
};
pub use provider::{
    Provider, ProviderFragment, ProviderRequest, ProviderTurn, SamplingParams, ToolCallDelta, Usage,
    WireMessage, WireRole, WireToolCall,
};
pub use schema::{Param, ParamType, Property, ToolSchema, ToolSpec};
pub use stream::LazyStream;
pub use tool::{Tool, ToolArgs, ToolOutput, ToolRegistry};
