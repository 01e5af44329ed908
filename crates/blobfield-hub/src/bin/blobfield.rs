//! Blobfield server binary
//!
//! Serves the installation front-end and runs the session hub.

use blobfield_hub::{BlobfieldServer, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blobfield=info,blobfield_hub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!("Starting Blobfield");
    tracing::info!("  Max users: {}", config.hub.max_users);
    tracing::info!("  Step interval: {:?}", config.hub.tick_interval);

    let server = BlobfieldServer::new(config);
    server.serve().await?;

    Ok(())
}
