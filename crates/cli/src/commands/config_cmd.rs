//! `personax config`: Show the effective configuration or create a default one.

use personax_config::AppConfig;

pub async fn run(init: bool) -> Result<(), Box<dyn std::error::Error>> {
    if init {
        return write_default();
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("# {}", AppConfig::config_path().display());
    println!("{}", render(&config)?);
    Ok(())
}

fn write_default() -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    if path.exists() {
        println!("  Config file already exists: {}", path.display());
        return Ok(());
    }
    std::fs::create_dir_all(AppConfig::config_dir())?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("  Wrote default config to {}", path.display());
    Ok(())
}

/// TOML of the configuration with secrets masked.
fn render(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("[REDACTED]".into());
    }
    if shown.services.amap_weather.key.is_some() {
        shown.services.amap_weather.key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&shown)
}
