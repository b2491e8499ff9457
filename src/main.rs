use voicememo::app::App;
use voicememo::config::Config;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Starting voicememo");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    let app = App::new(config).await?;
    app.run().await
}
