use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (PARTYTREE_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("PARTYTREE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("partytree_server=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = partytree_server::config::ServerConfig::parse();
    tracing::info!("Starting party server on {}", config.listen_addr);
    tracing::info!("Database: {}", config.db_path);

    let server = partytree_server::server::Server::new(config);
    server.run().await
}
