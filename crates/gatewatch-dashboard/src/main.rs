use anyhow::Result;
use gatewatch_dashboard::{app, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatewatch-dashboard starting");

    app::run(config).await
}
