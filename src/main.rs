//! Blueprint - Main entry point

use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use blueprint::cli::{Cli, Commands};
use blueprint::config::BlueprintConfig;
use blueprint::export::ExportPipeline;
use blueprint::host::{Capabilities, Host, LocalSite, PackageKind};
use blueprint::import::ImportPipeline;
use blueprint::importers::{ProcessorRegistry, StepProcessor};
use blueprint::json_schema::{JsonSchemaValidator, SchemaValidator};
use blueprint::logger::{BlueprintLogger, MemorySink};
use blueprint::result::{MessageLevel, StepResult};
use blueprint::session::{ImportGate, SessionStore};
use blueprint::sql_guard::SqlGuard;
use blueprint::step::BlueprintSchema;
use blueprint::storage::{DirectoryFetcher, StorageRegistry};

/// Initialize tracing; `RUST_LOG` overrides the default `info` filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when the command ran but reported failures.
fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => BlueprintConfig::load_from_file(path)?,
        None => BlueprintConfig::default(),
    };

    match cli.command {
        Commands::Export {
            site,
            steps,
            output,
        } => export(&config, &site, &steps, output.as_deref()),
        Commands::Import {
            schema,
            site,
            packages,
            denied,
            audit,
        } => {
            let packages = packages.unwrap_or_else(|| site.join("packages"));
            import(&config, &schema, &site, &packages, &denied, audit)
        }
        Commands::Validate { schema } => validate(&config, &schema),
        Commands::CheckSql { statement } => check_sql(&config, &statement),
    }
}

fn local_host(site: &Path, packages: &Path, actor: Capabilities) -> Result<Host> {
    let site = Arc::new(LocalSite::open(site)?);
    let mut storage = StorageRegistry::new();
    for kind in [PackageKind::Plugin, PackageKind::Theme] {
        storage.add_storage(
            kind.default_resource(),
            DirectoryFetcher::new(packages.join(format!("{}s", kind))),
        );
        storage.add_storage(kind.default_resource(), DirectoryFetcher::new(packages));
    }
    Ok(Host::new(
        Arc::new(actor),
        site.clone(),
        site.clone(),
        site,
        Arc::new(storage),
    ))
}

fn export(
    config: &BlueprintConfig,
    site: &Path,
    steps: &[String],
    output: Option<&Path>,
) -> Result<bool> {
    let host = local_host(site, &site.join("packages"), Capabilities::all())?;
    let requested: Vec<&str> = steps.iter().map(String::as_str).collect();
    let schema = ExportPipeline::new(host, config).export(&requested)?;
    let json = schema.to_json_pretty()?;

    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write schema to {:?}", path))?;
            info!("Exported {} steps to {:?}", schema.steps.len(), path);
        }
        None => println!("{}", json),
    }
    Ok(true)
}

fn import(
    config: &BlueprintConfig,
    schema_path: &Path,
    site: &Path,
    packages: &Path,
    denied: &[String],
    audit: bool,
) -> Result<bool> {
    let payload = fs::read_to_string(schema_path)
        .with_context(|| format!("Failed to read schema from {:?}", schema_path))?;

    let actor = denied
        .iter()
        .fold(Capabilities::all(), |actor, cap| actor.without(cap));
    let sink = Arc::new(MemorySink::new());
    let pipeline = ImportPipeline::with_builtins(local_host(site, packages, actor)?, config)?
        .with_logger(BlueprintLogger::new(sink.clone()));

    let sessions = SessionStore::new(ImportGate::from_config(config));
    let token = sessions.open(&payload)?;

    let mut results = Vec::new();
    loop {
        let progress = sessions.advance(&token, &pipeline)?;
        print_result(&progress.result);
        results.push(progress.result);
        if progress.done {
            break;
        }
    }

    if audit {
        for entry in sink.entries() {
            println!("[{}] {} {}", entry.level, entry.message, entry.context);
        }
    }

    let failed = results.iter().filter(|r| !r.is_success()).count();
    info!("Imported {} steps, {} failed", results.len(), failed);
    Ok(failed == 0)
}

fn print_result(result: &StepResult) {
    let status = if result.is_success() { "ok" } else { "FAILED" };
    println!("{:<16} {}", result.step_type(), status);
    for message in result.messages(None) {
        if message.level != MessageLevel::Debug {
            println!("    {}: {}", message.level, message.message);
        }
    }
}

fn validate(config: &BlueprintConfig, schema_path: &Path) -> Result<bool> {
    let content = fs::read_to_string(schema_path)
        .with_context(|| format!("Failed to read schema from {:?}", schema_path))?;
    let schema = BlueprintSchema::from_json(&content)?;
    let registry = ProcessorRegistry::with_builtins(SqlGuard::new(&config.table_prefix)?);

    let mut valid = true;
    for (i, step) in schema.steps.iter().enumerate() {
        let Some(processor) = registry.get(step.step_type()) else {
            println!("step {} ({}): no importer for this step type", i, step.step_type());
            valid = false;
            continue;
        };
        let report = JsonSchemaValidator.validate(&step.to_document(), &processor.schema());
        for err in &report.errors {
            println!("step {} ({}): {}", i, step.step_type(), err);
        }
        valid &= report.is_valid();
    }

    if valid {
        println!("Schema is valid ({} steps)", schema.steps.len());
    }
    Ok(valid)
}

fn check_sql(config: &BlueprintConfig, statement: &str) -> Result<bool> {
    let guard = SqlGuard::new(&config.table_prefix)?;
    match guard.check(statement) {
        Ok(()) => {
            println!("allowed");
            Ok(true)
        }
        Err(rejection) => {
            println!("rejected at gate {}: {}", rejection.gate(), rejection);
            Ok(false)
        }
    }
}
