use shelly_grid_bridge::{logging, Config, ShellyGridService};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = Config::read_from_file(&config_path)?;
    logging::init(&config.log_level)?;

    info!("Start");
    let service = ShellyGridService::new(config).await;
    service.run().await;

    Ok(())
}
