use site_config::ConfigManager;

fn main() -> Result<(), site_config::Error> {
    // APP_ENV picks the environment file; APP_* variables override values
    let mut manager = ConfigManager::new("demos/config")?;

    let config = manager.config()?;
    println!("Environment: {} (debug={})", config.environment(), config.debug());
    println!(
        "Database: {}@{}:{}/{}",
        config.database_value("user").unwrap_or("?"),
        config.database_value("host").unwrap_or("?"),
        config.database_value("port").unwrap_or("?"),
        config.database_value("name").unwrap_or("?"),
    );

    let ttl = manager.get("cache.ttl_seconds", 60)?;
    println!("Cache TTL: {ttl:?}");

    Ok(())
}
