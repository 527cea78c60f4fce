//! pump-tracker - Pump.fun launch tracker
//!
//! Streams new tokens from PumpPortal and tracks their price via Jupiter.

use anyhow::Result;

use pump_tracker::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (API keys go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
