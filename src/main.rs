mod cli;
mod config;
mod destination;
mod error;
mod logging;
mod model;
mod providers;
mod source;

use anyhow::Result;
use clap::Parser;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    let config = config::load_config(cli.config.as_deref())?;

    cli::run(cli.command, &config).await
}
