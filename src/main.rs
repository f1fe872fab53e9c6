use anyhow::Result;
use clap::Parser;
use rewind::server::{DebugServer, ServerConfig};

/// Headless time-travel debug server: receives component snapshots over
/// WebSocket and logs them.
#[derive(Parser)]
#[command(name = "rewind-server", version, about)]
struct Args {
    /// Host address to bind to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Pretty-print received frames in the log.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let server = DebugServer::bind(ServerConfig {
        host: args.host,
        port: args.port,
        pretty_print: args.pretty,
    })
    .await?;

    tokio::signal::ctrl_c().await?;
    server.close();

    Ok(())
}
