use anyhow::Result;
use clap::Parser;
use opsctx_cli::{init_tracing, run_context_command, Cli, CliCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match &cli.command {
        CliCommand::Context(args) => {
            run_context_command(cli.config.as_deref(), cli.verbose, args).await
        }
    }
}
