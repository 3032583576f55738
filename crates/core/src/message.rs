//! Message and ledger domain types.
//!
//! The [`Ledger`] is the ordered, append-only conversation history owned by a
//! single completion call. Besides plain messages it records every tool call
//! the model requested and the result that was fed back for it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::LedgerError;

/// The role of a plain conversational message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (persona, enriched context)
    System,
    /// The end user
    User,
    /// The model
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordinary conversational turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the provider's tool_call.id)
    pub call_id: String,

    /// Name of the function the model wants to call
    pub function_name: String,

    /// Raw JSON text of the arguments, exactly as the model produced it
    pub arguments: String,
}

/// Content of a tool call result: plain text or a list of text parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Parts(Vec<String>),
}

impl ToolResultContent {
    /// Flatten into a single string (parts joined by newlines).
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts.join("\n"),
        }
    }
}

impl From<String> for ToolResultContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolResultContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// The outcome of executing a [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub content: ToolResultContent,
}

impl ToolCallResult {
    pub fn new(call_id: impl Into<String>, content: impl Into<ToolResultContent>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
        }
    }
}

/// One entry of the conversation ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEntry {
    Message(Message),
    ToolCallRequest(ToolCallRequest),
    ToolCallResult(ToolCallResult),
}

impl LedgerEntry {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }
}

/// Structural rules for a list of plain messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRules {
    /// Whether a single system message may lead the list.
    pub allow_leading_system: bool,
    /// Required role of the first non-system message.
    pub first_role: Role,
    /// Required role of the last message.
    pub last_role: Role,
}

impl MessageRules {
    /// Rules for messages coming from a caller: user first, strict
    /// alternation, ends on a user turn, no system messages.
    pub const INBOUND: Self = Self {
        allow_leading_system: false,
        first_role: Role::User,
        last_role: Role::User,
    };

    /// Rules for a seeded ledger: an optional leading system message, then
    /// the inbound rules.
    pub const SEEDED: Self = Self {
        allow_leading_system: true,
        first_role: Role::User,
        last_role: Role::User,
    };

    pub fn validate(&self, messages: &[Message]) -> Result<(), LedgerError> {
        let first = messages.first().ok_or(LedgerError::Empty)?;

        let skip = usize::from(self.allow_leading_system && first.role == Role::System);
        let mut prev: Option<Role> = None;

        for (index, msg) in messages.iter().enumerate().skip(skip) {
            if msg.role == Role::System {
                return Err(LedgerError::RoleNotAllowed {
                    role: msg.role.to_string(),
                    index,
                });
            }
            match prev {
                None if msg.role != self.first_role => {
                    return Err(LedgerError::InvalidFirstRole {
                        expected: self.first_role.to_string(),
                        actual: msg.role.to_string(),
                    });
                }
                Some(p) if p == msg.role => {
                    return Err(LedgerError::NotAlternating { index });
                }
                _ => {}
            }
            prev = Some(msg.role);
        }

        let last = prev.unwrap_or(first.role);
        if last != self.last_role {
            return Err(LedgerError::InvalidLastRole {
                expected: self.last_role.to_string(),
                actual: last.to_string(),
            });
        }
        Ok(())
    }
}

/// The ordered conversation history of one completion call.
///
/// Append-only. Tool call ids are unique across requests and every result
/// must answer a request that was appended before it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
    #[serde(skip)]
    requested: HashSet<String>,
    #[serde(skip)]
    answered: HashSet<String>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ledger from plain messages, enforcing [`MessageRules::SEEDED`].
    pub fn seeded(messages: Vec<Message>) -> Result<Self, LedgerError> {
        MessageRules::SEEDED.validate(&messages)?;
        Ok(Self {
            entries: messages.into_iter().map(LedgerEntry::Message).collect(),
            ..Self::default()
        })
    }

    /// Rebuild a ledger from arbitrary entries, checking tool call pairing.
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for entry in entries {
            ledger.push(entry)?;
        }
        Ok(ledger)
    }

    /// Append any entry, checking tool call pairing.
    pub fn push(&mut self, entry: LedgerEntry) -> Result<(), LedgerError> {
        match entry {
            LedgerEntry::Message(m) => {
                self.push_message(m);
                Ok(())
            }
            LedgerEntry::ToolCallRequest(r) => self.push_tool_request(r),
            LedgerEntry::ToolCallResult(r) => self.push_tool_result(r),
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.entries.push(LedgerEntry::Message(message));
    }

    pub fn push_tool_request(&mut self, request: ToolCallRequest) -> Result<(), LedgerError> {
        if !self.requested.insert(request.call_id.clone()) {
            return Err(LedgerError::DuplicateCallId(request.call_id));
        }
        self.entries.push(LedgerEntry::ToolCallRequest(request));
        Ok(())
    }

    pub fn push_tool_result(&mut self, result: ToolCallResult) -> Result<(), LedgerError> {
        if !self.requested.contains(&result.call_id) {
            return Err(LedgerError::UnknownCallId(result.call_id));
        }
        if !self.answered.insert(result.call_id.clone()) {
            return Err(LedgerError::CallAlreadyAnswered(result.call_id));
        }
        self.entries.push(LedgerEntry::ToolCallResult(result));
        Ok(())
    }

    /// Whether a request with this call id has been recorded.
    pub fn has_call(&self, call_id: &str) -> bool {
        self.requested.contains(call_id)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LedgerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Plain messages only, in order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(LedgerEntry::as_message)
    }

    pub fn into_entries(self) -> Vec<LedgerEntry> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a LedgerEntry;
    type IntoIter = std::slice::Iter<'a, LedgerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
