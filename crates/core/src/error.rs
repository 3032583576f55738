//! Error types for the PersonaX domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum. Every error is `Clone` so a
//! failed [`LazyStream`](crate::stream::LazyStream) can store it and re-raise
//! it when the stream is replayed.

use thiserror::Error;

/// The top-level error type for all PersonaX operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // --- Provider transport errors (fatal to the current call) ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors that were not recoverable ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Conversation structure ---
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    // --- External resources (REST services) ---
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    // --- Persona registry ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Tool-calling loop guard ---
    #[error("Tool-calling loop exceeded {limit} iterations")]
    IterationLimit { limit: u32 },

    // --- Context composition ---
    #[error("Context error: {0}")]
    Context(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised by a tool or by the tool contract layer.
///
/// Recoverable variants are folded back into the ledger as placeholder
/// results and the tool-calling loop keeps going. `Internal` and
/// `InvalidSpec` are treated as bugs and propagate to the caller.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    Failed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid tool definition: {0}")]
    InvalidSpec(String),

    #[error("Unexpected failure in tool {tool_name}: {reason}")]
    Internal { tool_name: String, reason: String },
}

impl ToolError {
    /// Convenience constructor for the domain "tool call failed" error.
    pub fn failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the completion loop may substitute a placeholder and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Failed { .. }
                | Self::Timeout { .. }
                | Self::InvalidArguments(_)
        )
    }
}

/// Violations of the conversation-structure rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Messages cannot be empty")]
    Empty,

    #[error("First message must be {expected}, got {actual}")]
    InvalidFirstRole { expected: String, actual: String },

    #[error("Last message must be {expected}, got {actual}")]
    InvalidLastRole { expected: String, actual: String },

    #[error("Role {role} is not allowed at position {index}")]
    RoleNotAllowed { role: String, index: usize },

    #[error("Messages must alternate between 'user' and 'assistant' (position {index})")]
    NotAlternating { index: usize },

    #[error("Duplicate tool call id: {0}")]
    DuplicateCallId(String),

    #[error("Tool result references unknown call id: {0}")]
    UnknownCallId(String),

    #[error("Tool call id {0} already has a result")]
    CallAlreadyAnswered(String),
}

/// Errors from REST data sources consumed by tools.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Service rejected the request: {0}")]
    Rejected(String),

    #[error("No data available: {0}")]
    NoData(String),
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Persona with id '{0}' is already registered")]
    Duplicate(String),

    #[error("Persona with id '{0}' is not registered")]
    Unknown(String),

    #[error("Invalid persona definition: {0}")]
    Invalid(String),
}
