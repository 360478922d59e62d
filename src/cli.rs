use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Blueprint - export a site's configuration as steps and import it elsewhere
#[derive(Parser)]
#[command(name = "blueprint")]
#[command(about = "Export and import site configuration as declarative blueprint steps")]
#[command(version)]
pub struct Cli {
    /// Configuration file (JSON). Defaults are used when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export a local site into a blueprint schema
    Export {
        /// Site directory
        #[arg(long)]
        site: PathBuf,

        /// Only run exporters for these step types (repeatable)
        #[arg(long = "step")]
        steps: Vec<String>,

        /// Write the schema here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import a blueprint schema into a local site, one step at a time
    Import {
        /// Schema document to import
        schema: PathBuf,

        /// Site directory
        #[arg(long)]
        site: PathBuf,

        /// Directory holding plugin and theme packages (<slug>.zip or <slug>/).
        /// Defaults to <site>/packages.
        #[arg(long)]
        packages: Option<PathBuf>,

        /// Capabilities to withhold from the acting user (repeatable)
        #[arg(long = "deny")]
        denied: Vec<String>,

        /// Print the pipeline audit trail after the import
        #[arg(long)]
        audit: bool,
    },
    /// Check a schema document against the built-in step schemas
    Validate {
        /// Schema document to validate
        schema: PathBuf,
    },
    /// Run a statement through the SQL step guard without executing it
    CheckSql {
        /// The statement to check
        statement: String,
    },
}
