//! Puente Catastral CLI entry point.
//!
//! Binary name: `puente`
//!
//! Parses CLI arguments, sets up tracing, loads `config.toml` from the data
//! directory and dispatches to the command handlers.

mod cli;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use puente_infra::config::load_global_config;
use puente_infra::filesystem::resolve_data_dir;
use puente_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_directives};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(verbosity_directives(cli.verbose, cli.quiet), cli.otel) {
        eprintln!("Warning: tracing setup failed: {e}");
    }

    // Shell completions don't need configuration
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "puente", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = resolve_data_dir();
    let config = load_global_config(&data_dir).await;
    tracing::debug!(data_dir = %data_dir.display(), disposition = %config.approval.timeout_disposition, "configuration loaded");

    let result = match cli.command {
        Commands::List => cli::workflow::handle_list(cli.json),
        Commands::Show { workflow_id } => cli::workflow::handle_show(&workflow_id, cli.json),
        Commands::Export {
            workflow_id,
            format,
            out,
        } => {
            cli::workflow::handle_export(
                workflow_id.as_deref(),
                format.map(Into::into),
                out,
                &data_dir,
                &config,
                cli.json,
                cli.quiet,
            )
            .await
        }
        Commands::Validate { file } => cli::workflow::handle_validate(file.as_deref(), cli.json, cli.quiet),
        Commands::Simulate(args) => cli::simulate::handle_simulate(&args, &config, cli.json, cli.quiet).await,
        Commands::Schema => cli::workflow::handle_schema(),
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}
