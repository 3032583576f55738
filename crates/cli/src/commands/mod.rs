pub mod chat;
pub mod config_cmd;
pub mod status;

use personax_config::AppConfig;
use personax_engine::{CompletionEngine, Core, PersonaId, SystemPromptComposer};
use std::sync::Arc;
use tracing::debug;

/// Identity of the configured persona.
pub fn persona_id(config: &AppConfig) -> Result<PersonaId, Box<dyn std::error::Error>> {
    let mut id = PersonaId::new(&config.persona.name)?;
    if let Some(version) = &config.persona.version {
        id = id.with_version(version);
    }
    if let Some(scenario) = &config.persona.scenario {
        id = id.with_scenario(scenario);
    }
    Ok(id)
}

/// Assemble the configured persona: provider, tools, engine and context.
pub fn build_core(config: &AppConfig) -> Result<Core, Box<dyn std::error::Error>> {
    let provider = personax_providers::build_from_config(config)?;
    let tools = personax_tools::default_registry(&config.services)?;
    debug!(
        base_url = %config.base_url,
        model = %config.model,
        tools = tools.len(),
        max_iterations = config.engine.max_iterations,
        "Assembling persona core"
    );

    let engine = CompletionEngine::new(provider)
        .with_max_iterations(config.engine.max_iterations)
        .with_tool_concurrency(config.engine.tool_concurrency)
        .with_sampling(config.sampling.to_params());

    Ok(Core::new(persona_id(config)?, engine, &config.model)
        .with_context(Arc::new(SystemPromptComposer::new(&config.persona.system_prompt)))
        .with_tools(tools)
        .with_max_tokens(config.max_tokens))
}
