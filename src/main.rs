use clap::Parser;
use env_logger::Env;

use tabdeck::app;
use tabdeck::config::{AppConfig, ServerArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = AppConfig::from(ServerArgs::parse());

    // Start the web application
    app::run(config).await?;

    Ok(())
}
