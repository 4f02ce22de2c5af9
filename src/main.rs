use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mapscout::app::RunContext;
use mapscout::cli::{commands, Cli};
use mapscout::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for results
    let filter = if cli.debug {
        EnvFilter::new("mapscout=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mapscout=info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config)?;

    let input = commands::read_input(cli.input.as_deref()).await?;
    let writer = commands::open_writer(cli.results.as_deref(), cli.json).await?;
    let ctx = RunContext::new(config)?;

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping run");
            cancel.cancel();
        }
    });

    let summary = commands::scrape(&ctx, &input, writer).await?;
    info!(
        "{} jobs succeeded, {} failed, stop reason: {:?}",
        summary.stats.succeeded, summary.stats.failed, summary.stop_reason
    );

    Ok(())
}
