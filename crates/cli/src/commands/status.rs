//! `personax status`: Show system status.

use personax_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("PersonaX Status");
    println!("===============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Persona:      {}", super::persona_id(&config)?);
    println!("  Endpoint:     {}", config.base_url);
    println!("  Model:        {}", config.model);
    println!("  Max turns:    {}", config.engine.max_iterations);
    println!("  Tool workers: {}", config.engine.tool_concurrency);
    println!(
        "  Weather tool: {}",
        if config.services.amap_weather.key.is_some() { "enabled" } else { "disabled (no Amap key)" }
    );

    if AppConfig::config_path().exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file, run `personax config --init` first");
    }

    if !config.has_api_key() {
        println!("  ⚠️  No API key configured");
        return Ok(());
    }

    let provider = personax_providers::build_from_config(&config)?;
    match provider.health_check().await {
        Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
        Ok(false) => println!("  ⚠️  Provider '{}' responded with an error", provider.name()),
        Err(e) => println!("  ❌ Provider '{}' unreachable: {e}", provider.name()),
    }
    Ok(())
}
