//! `dataserv` CLI entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dataserv::{Args, Broker};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.default_log_filter()),
    )
    .format_timestamp_secs()
    .init();

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let (broker, listener) = Broker::bind(args.port)
        .await
        .with_context(|| format!("binding to 127.0.0.1:{}", args.port))?;
    let broker = Arc::new(broker);

    log::info!("dataserv listening on 127.0.0.1:{}", args.port);

    let shutdown = Arc::clone(&broker);
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        shutdown.stop();
    })
    .context("installing Ctrl-C handler")?;

    broker.serve(listener).await;
    log::info!("dataserv exiting");
    Ok(())
}
