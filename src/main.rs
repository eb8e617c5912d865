use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sparkify_etl::config;
use sparkify_etl::etl::{run_pipeline, BatchOptions};
use sparkify_etl::warehouse::{latest_schema, render_dot, SqliteWarehouse};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

/// Load the song metadata and activity log datasets into the warehouse.
#[derive(Parser, Debug)]
#[command(name = "sparkify-etl", version)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite warehouse database file, created if missing.
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Root of the song metadata tree.
    #[clap(long, value_parser = parse_path, default_value = "data/song_data")]
    pub song_data: PathBuf,

    /// Root of the activity log tree.
    #[clap(long, value_parser = parse_path, default_value = "data/log_data")]
    pub log_data: PathBuf,

    /// Drop and recreate every warehouse table before loading.
    #[clap(long, default_value_t = false)]
    pub reset: bool,

    /// Process every file even if an identical copy was already loaded.
    #[clap(long, default_value_t = false)]
    pub reload: bool,

    /// Stop at the first file that fails to load.
    #[clap(long, default_value_t = false)]
    pub fail_fast: bool,

    /// Do not draw progress bars.
    #[clap(long, default_value_t = false)]
    pub no_progress: bool,

    /// Also write the warehouse ER diagram (Graphviz DOT) to this path.
    #[clap(long, value_parser = parse_path)]
    pub er_diagram: Option<PathBuf>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_path: args.db_path.clone(),
            song_data: args.song_data.clone(),
            log_data: args.log_data.clone(),
            fail_fast: args.fail_fast,
            reload: args.reload,
            show_progress: !args.no_progress,
        }
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!(
        "sparkify-etl {}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_path: {:?}", app_config.db_path);
    info!("  song_data: {:?}", app_config.song_data);
    info!("  log_data: {:?}", app_config.log_data);
    info!("  retry: {:?}", app_config.retry);

    if !app_config.db_path.exists() {
        info!("Creating new warehouse database at {:?}", app_config.db_path);
    }
    let store = SqliteWarehouse::open(&app_config.db_path, app_config.database.busy_timeout())?;

    if cli_args.reset {
        info!("Resetting warehouse tables...");
        store.reset()?;
    }

    if let Some(path) = &cli_args.er_diagram {
        std::fs::write(path, render_dot(latest_schema()))
            .with_context(|| format!("Failed to write ER diagram to {:?}", path))?;
        info!("ER diagram written to {:?}", path);
    }

    let options = BatchOptions::from_config(&app_config);
    let report = run_pipeline(&store, &app_config.song_data, &app_config.log_data, &options)?;

    info!("");
    info!("Load Summary");
    info!("============");
    for line in report.summary().lines() {
        info!("{}", line);
    }
    info!("Warehouse contains: {}", store.counts()?);

    if report.has_failures() {
        bail!("{} file(s) failed to load", report.failure_count());
    }

    info!("Load completed successfully!");
    Ok(())
}
