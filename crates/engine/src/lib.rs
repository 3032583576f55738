//! # PersonaX Engine
//!
//! The tool-calling completion loop and the persona layer around it.
//!
//! A [`CompletionEngine`] sends the ledger to a provider, runs the tools the
//! model asks for, appends their results and repeats until the model answers
//! without tool calls. It runs atomically ([`CompletionEngine::complete`]) or
//! incrementally ([`CompletionEngine::complete_stream`]).
//!
//! A [`Core`] wraps an engine with a persona identity, a context composer and
//! a tool set. A [`PersonaRegistry`] holds several of them.

pub mod accumulator;
pub mod dispatch;
pub mod engine;
pub mod persona;
pub mod registry;
pub mod streaming;
pub mod wire;

pub use engine::{CompletionEngine, CompletionRequest, DEFAULT_MAX_ITERATIONS};
pub use persona::{
    CompleteOptions, CompletionOutput, ContextComposer, ContextExtras, Core, PassthroughComposer, PersonaId,
    SystemPromptComposer,
};
pub use registry::PersonaRegistry;
pub use streaming::StreamingCompletion;
