//! multichat CLI entry point.

use clap::Parser;

use multichat::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run(args) => multichat::cli::commands::run::execute(args, config, cli.json).await,
        Commands::Status => multichat::cli::commands::status::execute(config, cli.json).await,
        Commands::Check => multichat::cli::commands::check::execute(config, cli.json).await,
    };

    if let Err(err) = result {
        multichat::cli::handle_error(err, cli.json);
    }
}
