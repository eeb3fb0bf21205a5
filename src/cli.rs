use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Mapping-driven file ingestion into staging tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute an ingestion run over every configured table mapping
    Run(RunArgs),
    /// Render the configured table and column mappings as a table
    Mappings(MappingsArgs),
    /// Validate a mapping configuration without touching files or the sink
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Mapping configuration YAML file
    #[arg(short = 'm', long = "mappings")]
    pub mappings: PathBuf,
    /// Directory holding the staging tables
    #[arg(short = 's', long = "staging-dir")]
    pub staging_dir: PathBuf,
    /// Destination schema YAML describing staging tables and column widths
    #[arg(short = 'd', long = "destination-schema")]
    pub destination_schema: PathBuf,
    /// Append audit events to this JSONL file (log-only if omitted)
    #[arg(short = 'a', long = "audit")]
    pub audit: Option<PathBuf>,
    /// Call-level timeout for bulk loads, in seconds
    #[arg(long = "load-timeout-secs", default_value_t = 300)]
    pub load_timeout_secs: u64,
    /// Character encoding of delimited input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct MappingsArgs {
    /// Mapping configuration YAML file
    #[arg(short = 'm', long = "mappings")]
    pub mappings: PathBuf,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Mapping configuration YAML file
    #[arg(short = 'm', long = "mappings")]
    pub mappings: PathBuf,
    /// Destination schema YAML to cross-check referenced tables against
    #[arg(short = 'd', long = "destination-schema")]
    pub destination_schema: Option<PathBuf>,
}
