//! Binary entry point.

use clap::Parser;
use tracing::info;
use vigil_bot::{AppConfig, Application};

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Automated trade execution core")]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    vigil_telemetry::init_logging()?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting vigil");

    let config_path = args
        .config
        .or_else(|| std::env::var("VIGIL_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = AppConfig::load_or_default(&config_path);

    let app = Application::new(config)?;
    app.run().await?;
    Ok(())
}
