pub mod archive;
pub mod audit;
pub mod cli;
pub mod error;
pub mod io_utils;
pub mod loader;
pub mod mapper;
pub mod mapping;
pub mod pipeline;
pub mod reader;
pub mod reconcile;
pub mod rowset;
pub mod sink;
pub mod table;

use std::{env, sync::OnceLock, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    audit::{AuditSink, JsonlAudit, LogAudit},
    cli::{CheckArgs, Cli, Commands, MappingsArgs, RunArgs},
    mapping::{MappingRepository, YamlMappingRepository},
    pipeline::RunOptions,
    sink::CsvDirSink,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("staged_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Mappings(args) => handle_mappings(&args),
        Commands::Check(args) => handle_check(&args),
    }
}

fn handle_run(args: &RunArgs) -> Result<()> {
    let repository = YamlMappingRepository::load(&args.mappings)
        .with_context(|| format!("Loading mapping configuration from {:?}", args.mappings))?;
    let sink = CsvDirSink::open(&args.staging_dir, &args.destination_schema)?;
    let audit: Box<dyn AuditSink> = match &args.audit {
        Some(path) => Box::new(JsonlAudit::open(path)?),
        None => Box::new(LogAudit),
    };
    let options = RunOptions {
        load_timeout: Duration::from_secs(args.load_timeout_secs),
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    };

    let summary = pipeline::execute_run(&repository, &sink, audit.as_ref(), &options)?;
    info!(
        "Run finished: {} file(s) loaded, {} skipped, {} failed, {} row(s) staged",
        summary.files_loaded, summary.files_skipped, summary.files_failed, summary.rows_loaded
    );
    Ok(())
}

fn handle_mappings(args: &MappingsArgs) -> Result<()> {
    let repository = YamlMappingRepository::load(&args.mappings)
        .with_context(|| format!("Loading mapping configuration from {:?}", args.mappings))?;
    let mappings = repository.table_mappings()?;
    if mappings.is_empty() {
        info!("No table mappings configured in {:?}", args.mappings);
        return Ok(());
    }

    let headers = vec![
        "table".to_string(),
        "kind".to_string(),
        "pattern".to_string(),
        "source".to_string(),
        "columns".to_string(),
        "required".to_string(),
    ];
    let mut rows = Vec::with_capacity(mappings.len());
    for mapping in &mappings {
        let required = mapping
            .columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.from.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        rows.push(vec![
            mapping.table.clone(),
            format!("{:?}", mapping.kind).to_lowercase(),
            mapping.pattern.clone(),
            mapping.source_dir.display().to_string(),
            mapping.columns.len().to_string(),
            required,
        ]);
    }
    table::print_table(&headers, &rows);
    info!("Listed {} table mapping(s)", mappings.len());
    Ok(())
}

fn handle_check(args: &CheckArgs) -> Result<()> {
    let repository = YamlMappingRepository::load(&args.mappings)
        .with_context(|| format!("Loading mapping configuration from {:?}", args.mappings))?;
    let mappings = repository.table_mappings()?;
    info!(
        "Mapping configuration {:?} is valid: {} table mapping(s)",
        args.mappings,
        mappings.len()
    );

    if let Some(schema_path) = &args.destination_schema {
        let tables = sink::destination_tables(schema_path)?;
        let mut missing = 0usize;
        for mapping in &mappings {
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(&mapping.table)) {
                warn!(
                    "Table '{}' is mapped but absent from {:?}",
                    mapping.table, schema_path
                );
                missing += 1;
            }
        }
        if missing > 0 {
            anyhow::bail!("{missing} mapped table(s) missing from the destination schema");
        }
        info!("All mapped tables exist in {schema_path:?}");
    }
    Ok(())
}
