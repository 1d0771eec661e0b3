use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rule_adapter::config::Config;
use rule_adapter::policy::{Filter, SqliteAdapter};
use rule_adapter::transport::cli;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    env!("RULEADM_VERSION_SUFFIX")
);

#[derive(Parser)]
#[command(name = "ruleadm")]
#[command(author, version = VERSION, about = "ruleadm - inspect and edit policy rule databases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the configured path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored rules, optionally filtered per field
    List {
        /// Accepted policy types (repeatable)
        #[arg(long)]
        ptype: Vec<String>,

        /// Accepted values for v0 (repeatable)
        #[arg(long)]
        v0: Vec<String>,

        /// Accepted values for v1 (repeatable)
        #[arg(long)]
        v1: Vec<String>,

        /// Accepted values for v2 (repeatable)
        #[arg(long)]
        v2: Vec<String>,

        /// Accepted values for v3 (repeatable)
        #[arg(long)]
        v3: Vec<String>,

        /// Accepted values for v4 (repeatable)
        #[arg(long)]
        v4: Vec<String>,

        /// Accepted values for v5 (repeatable)
        #[arg(long)]
        v5: Vec<String>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Add a rule
    Add {
        /// Policy type (p, g, ...)
        ptype: String,

        /// Rule fields, up to six
        fields: Vec<String>,
    },

    /// Remove rules equal to the given one
    Remove {
        /// Policy type (p, g, ...)
        ptype: String,

        /// Rule fields; omitted trailing fields must be empty
        fields: Vec<String>,
    },

    /// Remove rules whose fields from an index on match the given values
    RemoveFiltered {
        /// Policy type (p, g, ...)
        ptype: String,

        /// First field position to match (0-5)
        field_index: usize,

        /// Values for consecutive fields; an empty value matches anything
        values: Vec<String>,
    },

    /// Load a policy file into the database
    Import {
        /// Policy file (`ptype, v0, v1, ...` per line)
        file: PathBuf,

        /// Add to the stored rules instead of replacing them
        #[arg(long)]
        append: bool,
    },

    /// Write every stored rule as a policy file
    Export {
        /// Output file (default: stdout)
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "rule_adapter=debug,ruleadm=debug"
    } else {
        "rule_adapter=info,ruleadm=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    let adapter = SqliteAdapter::open(&config)?;
    tracing::debug!(
        "Using rule table '{}' in {:?}",
        adapter.table(),
        config.database.path
    );

    match cli.command {
        Commands::List {
            ptype,
            v0,
            v1,
            v2,
            v3,
            v4,
            v5,
            format,
        } => {
            let filter = Filter::from_lists(ptype, [v0, v1, v2, v3, v4, v5]);
            cli::run_list(&adapter, &filter, &format)?;
        }
        Commands::Add { ptype, fields } => {
            cli::run_add(&adapter, &ptype, &fields)?;
        }
        Commands::Remove { ptype, fields } => {
            cli::run_remove(&adapter, &ptype, &fields)?;
        }
        Commands::RemoveFiltered {
            ptype,
            field_index,
            values,
        } => {
            cli::run_remove_filtered(&adapter, &ptype, field_index, &values)?;
        }
        Commands::Import { file, append } => {
            cli::run_import(&adapter, &file, append)?;
        }
        Commands::Export { file } => {
            cli::run_export(&adapter, file.as_deref())?;
        }
    }

    Ok(())
}
