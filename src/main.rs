/// ArcID identity service
use arcid::{config::ServerConfig, context::AppContext, error::ArcIdResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ArcIdResult<()> {
    // Load configuration first so the log format can follow it
    let config = ServerConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting ArcID");

    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}
