//! Warehouse schema maintenance: create, drop, reset and validate the
//! tables, print their DDL, or write the ER diagram.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sparkify_etl::config::DatabaseSettings;
use sparkify_etl::warehouse::{latest_schema, render_dot, SqliteWarehouse};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "cli-schema", version)]
struct CliArgs {
    /// Path to the SQLite warehouse database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// How long to wait on a locked database, in milliseconds.
    #[clap(long, default_value_t = DatabaseSettings::default().busy_timeout_ms)]
    pub busy_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the warehouse tables if they do not exist yet.
    Create,

    /// Drops every warehouse table, fact table first.
    Drop,

    /// Drops and recreates every warehouse table.
    Reset,

    /// Checks an existing database against the expected schema.
    Validate,

    /// Prints the CREATE statements for every table and index.
    Ddl,

    /// Writes the ER diagram as a Graphviz DOT document.
    Diagram {
        /// Output file, stdout if omitted.
        #[clap(value_parser = parse_path)]
        output: Option<PathBuf>,
    },

    /// Prints the number of rows in each table.
    Counts,
}

fn require_db_path(args: &CliArgs) -> Result<&Path> {
    match &args.db_path {
        Some(path) => Ok(path),
        None => bail!("--db-path is required for this command"),
    }
}

fn open_existing(path: &Path) -> Result<Connection> {
    if !path.exists() {
        bail!("Database file does not exist: {:?}", path);
    }
    Connection::open(path).with_context(|| format!("Failed to open database: {:?}", path))
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let busy_timeout = Duration::from_millis(args.busy_timeout_ms);

    match &args.command {
        Command::Create => {
            let path = require_db_path(&args)?;
            let store = SqliteWarehouse::open(path, busy_timeout)?;
            info!("Warehouse ready at {:?}: {}", path, store.counts()?);
        }
        Command::Drop => {
            let path = require_db_path(&args)?;
            let conn = open_existing(path)?;
            latest_schema().drop_if_exists(&conn)?;
            info!("Dropped warehouse tables in {:?}", path);
        }
        Command::Reset => {
            let path = require_db_path(&args)?;
            let store = SqliteWarehouse::open(path, busy_timeout)?;
            store.reset()?;
        }
        Command::Validate => {
            let path = require_db_path(&args)?;
            let conn = open_existing(path)?;
            latest_schema()
                .validate(&conn)
                .with_context(|| format!("Schema validation failed for {:?}", path))?;
            info!("Schema of {:?} is valid", path);
        }
        Command::Ddl => {
            for statement in latest_schema().ddl() {
                println!("{}", statement);
            }
        }
        Command::Diagram { output } => {
            let dot = render_dot(latest_schema());
            match output {
                Some(path) => {
                    std::fs::write(path, dot)
                        .with_context(|| format!("Failed to write ER diagram to {:?}", path))?;
                    info!("ER diagram written to {:?}", path);
                }
                None => print!("{}", dot),
            }
        }
        Command::Counts => {
            let path = require_db_path(&args)?;
            if !path.exists() {
                bail!("Database file does not exist: {:?}", path);
            }
            let store = SqliteWarehouse::open(path, busy_timeout)?;
            println!("{}", store.counts()?);
        }
    }

    Ok(())
}
