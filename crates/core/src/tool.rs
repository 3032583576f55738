//! Tool trait: the abstraction over callable functions offered to the model.
//!
//! A tool owns a [`ToolSpec`] (name, description, declared parameters) and an
//! async `invoke`. The completion engine looks tools up by name in a
//! [`ToolRegistry`], parses the model's raw JSON arguments, invokes the tool
//! and folds the [`ToolOutput`] back into the ledger as text.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;
use crate::message::{ToolCallRequest, ToolResultContent};
use crate::schema::{ToolSchema, ToolSpec};

/// Parsed tool arguments keyed by parameter name.
pub type ToolArgs = serde_json::Map<String, Value>;

/// What a tool returns.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Passed to the model unchanged.
    Text(String),
    /// Any JSON value. Strings pass through, arrays are encoded per item,
    /// everything else is encoded whole.
    Json(Value),
    /// A list of outputs, each encoded on its own.
    List(Vec<ToolOutput>),
    /// No result. Rendered as `null`.
    Empty,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Serialize a structured result.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }

    /// Render into the content of a ledger tool-call result.
    pub fn into_content(self) -> ToolResultContent {
        match self {
            Self::Text(text) => ToolResultContent::Text(text),
            Self::Json(Value::String(text)) => ToolResultContent::Text(text),
            Self::Json(Value::Array(items)) => {
                ToolResultContent::Parts(items.into_iter().map(Self::Json).map(Self::into_part).collect())
            }
            Self::Json(value) => ToolResultContent::Text(value.to_string()),
            Self::List(items) => ToolResultContent::Parts(items.into_iter().map(Self::into_part).collect()),
            Self::Empty => ToolResultContent::Text(Value::Null.to_string()),
        }
    }

    fn into_part(self) -> String {
        match self {
            Self::Text(text) | Self::Json(Value::String(text)) => text,
            Self::Json(value) => value.to_string(),
            Self::List(items) => Value::Array(items.into_iter().map(Self::into_value).collect()).to_string(),
            Self::Empty => Value::Null.to_string(),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Text(text) => Value::String(text),
            Self::Json(value) => value,
            Self::List(items) => Value::Array(items.into_iter().map(Self::into_value).collect()),
            Self::Empty => Value::Null,
        }
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

/// The core Tool trait.
///
/// Implementations build their [`ToolSpec`] once (usually in `new`) and hand
/// out a reference to it. Errors that are [`ToolError::is_recoverable`] become
/// placeholder results; anything else aborts the completion.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    fn name(&self) -> &str {
        self.spec().name()
    }

    /// The schema sent to the model. Derived on first call, then cached.
    fn schema(&self) -> &ToolSchema {
        self.spec().schema()
    }

    async fn invoke(&self, args: ToolArgs) -> Result<ToolOutput, ToolError>;
}

/// Parse the model's raw argument text and fill in declared defaults.
///
/// Empty text means no arguments. Anything that is not a JSON object is an
/// [`ToolError::InvalidArguments`].
pub fn prepare_arguments(spec: &ToolSpec, raw: &str) -> Result<ToolArgs, ToolError> {
    let mut args = if raw.trim().is_empty() {
        ToolArgs::new()
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "{}: expected a JSON object, got {other}",
                    spec.name()
                )));
            }
            Err(e) => {
                return Err(ToolError::InvalidArguments(format!("{}: {e}", spec.name())));
            }
        }
    };

    for param in spec.params() {
        if let Some(default) = &param.default {
            args.entry(param.name.clone()).or_insert_with(|| default.clone());
        }
    }
    Ok(args)
}

/// Decode arguments into a typed struct.
pub fn decode_args<T: DeserializeOwned>(tool_name: &str, args: ToolArgs) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ToolError::InvalidArguments(format!("{tool_name}: {e}")))
}

/// The set of tools available to one completion call.
///
/// Lookups are by name. Registering a second tool under an existing name
/// replaces the first in place, so schema order stays stable.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.by_name.get(&name) {
            Some(&index) => {
                tracing::warn!(tool = %name, "Tool registered twice, keeping the latest");
                self.tools[index] = tool;
            }
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// Schemas in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema().clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up, parse arguments and invoke.
    pub async fn execute(&self, request: &ToolCallRequest) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(&request.function_name)
            .ok_or_else(|| ToolError::NotFound(request.function_name.clone()))?;
        let args = prepare_arguments(tool.spec(), &request.arguments)?;
        tool.invoke(args).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}
