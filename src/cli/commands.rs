//! CLI commands and argument parsing

use crate::resolver::{RunScope, SelectionPolicy};
use crate::run::RunId;
use crate::types::Source;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SaaS-to-object-storage landing pipeline
#[derive(Parser, Debug)]
#[command(name = "saas-landing")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (YAML)
    #[arg(short, long, global = true, env = "LANDING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Landing destination (s3://, gs://, az://, memory:// or a local path)
    #[arg(short, long, global = true, env = "LANDING_DESTINATION")]
    pub destination: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract a source into the landing zone
    Extract {
        /// Source to extract (crm or tracking)
        source: Source,

        /// Entity types to run (comma-separated, empty = all)
        #[arg(long, value_delimiter = ',')]
        entities: Vec<String>,

        /// Run id override (YYYYMMDDTHHMMSSZ)
        #[arg(long)]
        run_id: Option<RunId>,
    },

    /// Print the current records of an entity type as NDJSON
    Resolve {
        source: Source,

        entity: String,

        /// Runs contributing records: latest or all
        #[arg(long, default_value = "latest")]
        scope: RunScope,

        /// Run selection: successful or lexicographic
        #[arg(long, default_value = "successful")]
        policy: SelectionPolicy,

        /// Unreadable landing lines tolerated (overrides the config file)
        #[arg(long)]
        max_bad_records: Option<usize>,
    },

    /// Show stored watermarks of a source
    Watermarks { source: Source },

    /// Show the run ledger of an entity type
    Runs { source: Source, entity: String },

    /// List entity types of a source
    Entities { source: Source },
}
