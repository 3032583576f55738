//! Persona identity, context composition and the persona core.

use async_trait::async_trait;
use personax_core::completion::Completion;
use personax_core::error::{RegistryError, Result};
use personax_core::message::{Ledger, Message, MessageRules};
use personax_core::tool::ToolRegistry;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::engine::{CompletionEngine, CompletionRequest};
use crate::streaming::StreamingCompletion;

/// Free-form extras handed to the context composer.
pub type ContextExtras = Map<String, Value>;

/// Turns caller messages into the enriched list that seeds the ledger.
///
/// The result must satisfy [`MessageRules::SEEDED`].
#[async_trait]
pub trait ContextComposer: Send + Sync {
    async fn compose(&self, messages: Vec<Message>, extras: &ContextExtras) -> Result<Vec<Message>>;
}

/// Uses the caller's messages as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughComposer;

#[async_trait]
impl ContextComposer for PassthroughComposer {
    async fn compose(&self, messages: Vec<Message>, _extras: &ContextExtras) -> Result<Vec<Message>> {
        Ok(messages)
    }
}

/// Prepends a fixed system prompt.
#[derive(Debug, Clone)]
pub struct SystemPromptComposer {
    prompt: String,
}

impl SystemPromptComposer {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into() }
    }
}

#[async_trait]
impl ContextComposer for SystemPromptComposer {
    async fn compose(&self, messages: Vec<Message>, _extras: &ContextExtras) -> Result<Vec<Message>> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        out.push(Message::system(self.prompt.clone()));
        out.extend(messages);
        Ok(out)
    }
}

/// Identity of a persona: `name[-version][@scenario]`.
///
/// The version `latest` and the scenario `default` are left out of the
/// rendered id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersonaId {
    name: String,
    version: Option<String>,
    scenario: Option<String>,
}

impl PersonaId {
    pub fn new(name: impl Into<String>) -> std::result::Result<Self, RegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::Invalid("persona name cannot be empty".into()));
        }
        Ok(Self {
            name,
            version: None,
            scenario: None,
        })
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("latest")
    }

    pub fn scenario(&self) -> &str {
        self.scenario.as_deref().unwrap_or("default")
    }
}

impl std::fmt::Display for PersonaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if self.version() != "latest" {
            write!(f, "-{}", self.version())?;
        }
        if self.scenario() != "default" {
            write!(f, "@{}", self.scenario())?;
        }
        Ok(())
    }
}

/// Per-call options for [`Core::complete`].
#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    pub stream: bool,
    pub extras: ContextExtras,
    pub cache_key: Option<String>,
    pub completion_id: Option<String>,
    /// Overrides the core's default.
    pub max_tokens: Option<u32>,
}

impl CompleteOptions {
    pub fn streaming() -> Self {
        Self {
            stream: true,
            ..Self::default()
        }
    }
}

/// What [`Core::complete`] produces.
#[derive(Debug)]
pub enum CompletionOutput {
    Complete(Completion),
    Stream(StreamingCompletion),
}

impl CompletionOutput {
    pub fn into_completion(self) -> Option<Completion> {
        match self {
            Self::Complete(c) => Some(c),
            Self::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<StreamingCompletion> {
        match self {
            Self::Stream(s) => Some(s),
            Self::Complete(_) => None,
        }
    }
}

/// A persona: identity, context composition, tools and a completion engine.
pub struct Core {
    id: PersonaId,
    context: Arc<dyn ContextComposer>,
    tools: Arc<ToolRegistry>,
    engine: CompletionEngine,
    model: String,
    max_tokens: Option<u32>,
}

impl Core {
    pub fn new(id: PersonaId, engine: CompletionEngine, model: impl Into<String>) -> Self {
        Self {
            id,
            context: Arc::new(PassthroughComposer),
            tools: Arc::new(ToolRegistry::new()),
            engine,
            model: model.into(),
            max_tokens: None,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextComposer>) -> Self {
        self.context = context;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn id(&self) -> &PersonaId {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn engine(&self) -> &CompletionEngine {
        &self.engine
    }

    /// Validate, compose, seed a fresh ledger and run the engine.
    pub async fn complete(&self, messages: Vec<Message>, options: CompleteOptions) -> Result<CompletionOutput> {
        MessageRules::INBOUND.validate(&messages)?;

        let composed = self.context.compose(messages, &options.extras).await?;
        let mut ledger = Ledger::seeded(composed)?;
        debug!(persona = %self.id, entries = ledger.len(), stream = options.stream, "Seeded ledger");

        let request = CompletionRequest {
            model: self.model.clone(),
            tools: Arc::clone(&self.tools),
            max_tokens: options.max_tokens.or(self.max_tokens),
            cache_key: options.cache_key,
            completion_id: options.completion_id,
        };

        if options.stream {
            Ok(CompletionOutput::Stream(self.engine.complete_stream(ledger, request)))
        } else {
            let completion = self.engine.complete(&mut ledger, &request).await?;
            Ok(CompletionOutput::Complete(completion))
        }
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("id", &self.id.to_string())
            .field("model", &self.model)
            .field("tools", &self.tools)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_omits_latest_and_default() {
        let id = PersonaId::new("helper").unwrap();
        assert_eq!(id.to_string(), "helper");
        assert_eq!(id.clone().with_version("latest").to_string(), "helper");
        assert_eq!(id.clone().with_version("2").to_string(), "helper-2");
        assert_eq!(id.clone().with_scenario("default").to_string(), "helper");
        assert_eq!(
            id.with_version("2").with_scenario("travel").to_string(),
            "helper-2@travel"
        );
    }

    #[test]
    fn empty_name_rejected() {
        assert!(matches!(PersonaId::new("  "), Err(RegistryError::Invalid(_))));
    }

    #[tokio::test]
    async fn system_prompt_is_prepended() {
        let composer = SystemPromptComposer::new("Be brief.");
        let out = composer
            .compose(vec![Message::user("hi")], &ContextExtras::new())
            .await
            .unwrap();
        assert_eq!(out, vec![Message::system("Be brief."), Message::user("hi")]);
        MessageRules::SEEDED.validate(&out).unwrap();
    }
}
