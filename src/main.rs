// ABOUTME: CLI entry point for dept-sync
// ABOUTME: Loads configuration, sets up logging, opens the table and runs export or sync

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dept_sync::config::{self, Config};
use dept_sync::{Backend, DepartmentTable, Reconciler, UpdatePolicy};

#[derive(Parser)]
#[command(name = "dept-sync")]
#[command(about = "Export the departments table to XML, or sync the table from an XML file", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./dept-sync.toml, then the user config directory)
    #[arg(long, global = true, env = "DEPT_SYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Database URL, overriding database.url from the configuration file
    #[arg(long = "database-url", global = true, env = "DEPT_SYNC_DATABASE_URL")]
    database_url: Option<String>,
    /// Database password, overriding database.password from the configuration file
    #[arg(
        long = "db-password",
        global = true,
        env = "DEPT_SYNC_DB_PASSWORD",
        hide_env_values = true
    )]
    db_password: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the departments table to an XML file
    Export {
        /// XML file to create or overwrite
        file: PathBuf,
    },
    /// Make the departments table match an XML file exactly
    Sync {
        /// XML file to read
        file: PathBuf,
        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Skip updates whose description is already up to date
        #[arg(long)]
        changed_only: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(&cli.log, config.log.file.as_deref())?;
    tracing::debug!("Database settings: {:?}", config.database);

    if let Err(err) = execute(&cli.command, &config).await {
        tracing::error!("{:#}", err);
        return Err(err);
    }
    Ok(())
}

async fn execute(command: &Commands, config: &Config) -> anyhow::Result<()> {
    let backend = dept_sync::connect(&config.database)
        .await
        .context("Failed to connect to the database. Check the connection settings")?;

    match backend {
        Backend::Postgres(mut table) => run(command, config, &mut table).await,
        Backend::Sqlite(mut table) => run(command, config, &mut table).await,
    }
}

async fn run<T: DepartmentTable>(
    command: &Commands,
    config: &Config,
    table: &mut T,
) -> anyhow::Result<()> {
    match command {
        Commands::Export { file } => {
            let report = dept_sync::export(table, file)
                .await
                .with_context(|| format!("Export to {} failed", file.display()))?;

            tracing::info!("Exported {} records to {}", report.records, file.display());
            println!(
                "Exported {} departments to {}",
                report.records,
                file.display()
            );
        }
        Commands::Sync {
            file,
            dry_run,
            changed_only,
        } => {
            let mut options = config.sync_options();
            options.dry_run = *dry_run;
            if *changed_only {
                options.update_policy = UpdatePolicy::ChangedOnly;
            }

            let report = Reconciler::new(options)
                .sync(table, file)
                .await
                .with_context(|| format!("Sync from {} failed", file.display()))?;

            if report.committed {
                println!(
                    "Synced departments from {}: {} deleted, {} updated, {} inserted, {} unchanged",
                    file.display(),
                    report.deleted,
                    report.updated,
                    report.inserted,
                    report.unchanged
                );
            } else {
                println!(
                    "Dry run for {}: would delete {}, update {}, insert {} ({} unchanged)",
                    file.display(),
                    report.deleted,
                    report.updated,
                    report.inserted,
                    report.unchanged
                );
            }
        }
    }
    Ok(())
}

/// Load the configuration file and apply command-line overrides.
///
/// A missing file is tolerated only when `--database-url` supplies the connection.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match config::locate(cli.config.as_deref()) {
        Ok(path) => Config::load(&path)?,
        Err(_) if cli.config.is_none() && cli.database_url.is_some() => Config::default(),
        Err(err) => return Err(err),
    };

    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(password) = &cli.db_password {
        config.database.password = Some(password.clone());
    }

    config.validate().context("Missing configuration")?;
    Ok(config)
}

/// Initialize logging
/// 1. RUST_LOG environment variable has highest precedence
/// 2. --log flag is used if RUST_LOG is not set
/// 3. Output goes to [log] file from the configuration, or stderr
fn init_logging(level: &str, file: Option<&Path>) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
