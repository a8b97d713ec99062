use anyhow::Context;
use tron_server::{config, Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    tracing::info!("Server Version: {}", tron_server::VERSION);

    let mut config = ServerConfig::from_env().context("Invalid configuration")?;
    // A port given on the command line wins over the environment
    if let Some(port) = std::env::args().nth(1) {
        config.port = config::parse_port(&port)?;
    }

    let port = config.port;
    let server = Server::new(config).bind(port).await?;
    tracing::info!("Listening on {}", server.local_addr()?);

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            shutdown.stop().await;
        }
    });

    server.run().await;
    Ok(())
}
