//! CLI command definitions for the `puente` binary.
//!
//! Commands operate on the built-in workflow catalog: inspect it, export it
//! for the workflow engine, validate definition files, and walk a workflow
//! with canned service responses.

pub mod simulate;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use puente_types::config::ExportFormat;

pub use simulate::SimulateArgs;

/// Inspect, export and simulate the Puente Catastral workflows.
#[derive(Parser)]
#[command(name = "puente", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "PUENTE_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List catalog workflows.
    #[command(alias = "ls")]
    List,

    /// Show the steps of a catalog workflow.
    Show {
        /// Workflow ID, e.g. `avaluo_catastral_v1`.
        workflow_id: String,
    },

    /// Write definitions in the workflow engine's format.
    Export {
        /// Export only this workflow (default: the whole catalog).
        workflow_id: Option<String>,

        /// Output format (default: `export.format` from config.toml).
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Output directory (default: `export.directory` from config.toml).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Validate a definition file, or the whole catalog when no file is given.
    Validate {
        /// `.json`, `.yaml` or `.yml` definition file.
        file: Option<PathBuf>,
    },

    /// Run a catalog workflow with canned service responses.
    Simulate(SimulateArgs),

    /// Print the JSON Schema of the definition format.
    Schema,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Json,
    Yaml,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Yaml => ExportFormat::Yaml,
        }
    }
}

/// Split `key=value`.
pub(crate) fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("clave_catastral=01-001-023-004").unwrap(),
            ("clave_catastral".to_string(), "01-001-023-004".to_string())
        );
        assert_eq!(
            parse_key_value("observaciones=a=b").unwrap(),
            ("observaciones".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("sin_valor").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["puente", "show", "avaluo_catastral_v1", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Show { ref workflow_id } if workflow_id == "avaluo_catastral_v1"));
    }

    #[test]
    fn test_export_format_flag() {
        let cli = Cli::try_parse_from(["puente", "export", "--format", "yaml"]).unwrap();
        let Commands::Export { workflow_id, format, out } = cli.command else {
            panic!("expected export");
        };
        assert!(workflow_id.is_none());
        assert!(out.is_none());
        assert_eq!(ExportFormat::from(format.unwrap()), ExportFormat::Yaml);
    }
}
