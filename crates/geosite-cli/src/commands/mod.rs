//! Command implementations

mod embed;
mod inspect;
mod select;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;
use anyhow::Result;

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Select(args) => select::execute(args, &output, config_path).await,
        Commands::Embed(args) => embed::execute(args, &output, config_path).await,
        Commands::Config => inspect::execute(&output, config_path),
    }
}
