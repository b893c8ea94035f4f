//! Arbor - directory object mapping from the command line
//!
//! Compile filter expressions, search a directory, inspect its schema and
//! delete or rename entries.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arbor_adapter::ConnectionAdapter;
use arbor_core::ArborConfig;

use commands::CommandContext;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(version = arbor_core::VERSION)]
#[command(about = "Directory object mapping and LDAP protocol adapter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "ARBOR_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ARBOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a filter expression (JSON or a literal filter) to LDAP syntax
    Filter {
        expression: String,
    },

    /// Search the directory
    Search {
        /// Search base; defaults to the configured base
        #[arg(short, long)]
        base: Option<String>,

        /// base, one or sub
        #[arg(short, long, default_value = "sub")]
        scope: String,

        /// Filter, literal or JSON expression
        #[arg(short, long)]
        filter: Option<String>,

        /// Attributes to return
        #[arg(short, long = "attr")]
        attributes: Vec<String>,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Inspect the server schema
    Schema {
        #[command(subcommand)]
        target: SchemaTarget,
    },

    /// Delete an entry
    Delete {
        dn: String,

        /// Delete the whole subtree with the tree delete control
        #[arg(short, long)]
        recursive: bool,
    },

    /// Rename or move an entry
    Rename {
        dn: String,

        new_rdn: String,

        /// Keep the old RDN value as an attribute value
        #[arg(long)]
        keep_old_rdn: bool,

        /// Move the entry under this DN
        #[arg(long)]
        new_superior: Option<String>,
    },
}

#[derive(Subcommand)]
enum SchemaTarget {
    /// Show an object class
    Class { name: String },
    /// Show an attribute type
    Attribute { name: String },
}

fn load_config(path: Option<&str>) -> anyhow::Result<ArborConfig> {
    let mut config = match path {
        Some(path) => ArborConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path))?,
        None => ArborConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level, &config.logging.format);
    debug!("Using connection {:?}", config.connection.endpoint()?);

    // Filter compilation needs no connection
    if let Commands::Filter { expression } = &cli.command {
        return commands::filter::execute(expression, cli.output);
    }

    let adapter = ConnectionAdapter::ldap3(config.connection.clone())?;
    let mut ctx = CommandContext {
        adapter,
        output_format: cli.output,
    };

    let result = match cli.command {
        Commands::Filter { .. } => Ok(()),
        Commands::Search {
            base,
            scope,
            filter,
            attributes,
            limit,
        } => {
            let opts = commands::search::SearchOptions {
                base,
                scope,
                filter,
                attributes,
                limit,
            };
            commands::search::execute(&mut ctx, opts).await
        }
        Commands::Schema { target } => match target {
            SchemaTarget::Class { name } => commands::schema::show_class(&mut ctx, &name).await,
            SchemaTarget::Attribute { name } => commands::schema::show_attribute(&mut ctx, &name).await,
        },
        Commands::Delete { dn, recursive } => commands::delete::execute(&mut ctx, &dn, recursive).await,
        Commands::Rename {
            dn,
            new_rdn,
            keep_old_rdn,
            new_superior,
        } => {
            commands::rename::execute(&mut ctx, &dn, &new_rdn, !keep_old_rdn, new_superior.as_deref()).await
        }
    };

    ctx.adapter.disconnect().await?;
    result
}
