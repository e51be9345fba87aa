//! msgflow server binary.

use msgflow_server::{telemetry, Application, Config};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    telemetry::init(config.app_env)?;

    info!(
        app_env = %config.app_env,
        address = %config.bind_address(),
        brokers = %config.kafka.brokers,
        "Starting msgflow server"
    );

    Application::new(config).run().await
}
