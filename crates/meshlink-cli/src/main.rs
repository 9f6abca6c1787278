//! meshlink demo binary.

mod cli;
mod demo;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    setup_logging(args.verbose);

    if let Err(err) = demo::run(args.transport, &args.name_a, &args.name_b, &args.message).await {
        error!(%err, "demo failed");
        std::process::exit(1);
    }
}

fn setup_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
