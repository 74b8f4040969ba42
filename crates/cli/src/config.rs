//! Command-line configuration.

use crate::commands::Command;
use clap::Parser;

/// Count rows of token-partitioned tables by splitting the token ring.
#[derive(Debug, Parser)]
#[command(name = "tokencount", version, about)]
pub struct CliConfig {
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Execute the selected command and print its result to stdout.
    pub async fn run(self) -> anyhow::Result<()> {
        let result = self.command.execute().await?;
        let mut stdout = std::io::stdout().lock();
        result.write(&mut stdout, self.json)
    }
}
