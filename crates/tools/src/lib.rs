//! Built-in tool implementations for PersonaX.
//!
//! Tools give the persona access to live data. Each tool declares its
//! parameters through a `ToolSpec`; the schema offered to the model is
//! derived from it.

pub mod weather;

pub use weather::{AmapWeatherService, GetWeather, WeatherInfo, WeatherService};

use personax_core::error::ToolError;
use personax_core::tool::ToolRegistry;
use std::sync::Arc;

/// Create the tool registry for the configured services.
///
/// Tools whose backing service has no credentials are left out.
pub fn default_registry(services: &personax_config::ServicesConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();

    let amap = AmapWeatherService::from_config(&services.amap_weather)
        .map_err(|e| ToolError::InvalidSpec(e.to_string()))?;
    match amap {
        Some(service) => registry.register(Arc::new(GetWeather::new(Arc::new(service))?)),
        None => tracing::info!("No Amap key configured, get_weather disabled"),
    }

    Ok(registry)
}
