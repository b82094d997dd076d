//! tvhpp CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tvhpp::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr: tvheadend records the enqueue hook's stderr in its
    // own log, and the consume service's stderr lands in the journal. stdout is
    // left to `tvhpp config`. RUST_LOG overrides the default `info` level.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Parse and execute CLI
    let cli = Cli::parse();
    cli.execute().await
}
