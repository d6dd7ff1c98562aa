use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subrelay::api::{self, AppState};
use subrelay::config::AppConfig;
use subrelay::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "subrelay=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    let services = ServiceContainer::new(config).await?;
    let state = AppState::new(services.clone());

    let cancellation_token = services.cancellation_token();
    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown_token.cancel();
        }
    });

    api::serve(state, cancellation_token).await?;
    services.shutdown().await;

    Ok(())
}
