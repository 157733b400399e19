use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use simplesql_core::{Context, Database};
use simplesql_db::{AnyBackend, BackendConfig, DatabaseConfig, MigrationSet, connect};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Output format for `status`.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Text,
    Json,
    Yaml,
}

#[derive(Debug, Parser)]
#[command(name = "simplesql")]
#[command(about = "Apply and inspect schema migrations for a simplesql database")]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = "simplesql.yml")]
    config: PathBuf,
    /// Log at debug level, including every statement sent.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a new configuration file.
    Init(InitArgs),
    /// Apply every pending migration.
    Migrate(MigrateArgs),
    /// Show the applied version and pending migrations.
    Status(StatusArgs),
    /// Run down scripts until the schema is at the given version.
    Revert(RevertArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    /// SQLite database file.
    #[arg(long, conflicts_with = "postgres", required_unless_present = "postgres")]
    sqlite: Option<PathBuf>,
    /// PostgreSQL connection URL.
    #[arg(long)]
    postgres: Option<String>,
    /// Migration directory or YAML bundle, relative to the config file.
    #[arg(long, default_value = "migrations")]
    migrations: PathBuf,
    /// Upper bound on a single statement, in milliseconds.
    #[arg(long)]
    statement_timeout_ms: Option<u64>,
    /// Overwrite an existing configuration file.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Give up if the run takes longer than this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Output format.
    #[arg(long, default_value = "text")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct RevertArgs {
    /// Version to revert to; `0` runs every down script.
    #[arg(long)]
    to: i64,
}

/// Serializable snapshot printed by `status`.
#[derive(Debug, Serialize)]
struct StatusReport {
    backend: &'static str,
    current_version: i64,
    latest_version: i64,
    pending: Vec<i64>,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Init(args) => run_init(&cli.config, args),
        Command::Migrate(args) => run_migrate(&cli.config, args),
        Command::Status(args) => run_status(&cli.config, args),
        Command::Revert(args) => run_revert(&cli.config, args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// init command
// ---------------------------------------------------------------------------

fn run_init(config_path: &Path, args: InitArgs) -> Result<(), String> {
    if config_path.exists() && !args.force {
        return Err(format!(
            "'{}' already exists; pass --force to overwrite",
            config_path.display()
        ));
    }
    let mut config = match (args.sqlite, args.postgres) {
        (Some(path), _) => DatabaseConfig::sqlite(path, &args.migrations),
        (None, Some(url)) => DatabaseConfig {
            backend: BackendConfig::Postgres { url },
            migrations: args.migrations.clone(),
            statement_timeout_ms: None,
        },
        (None, None) => return Err("Specify --sqlite or --postgres".to_string()),
    };
    config.statement_timeout_ms = args.statement_timeout_ms;

    config
        .save(config_path)
        .map_err(|e| format!("Failed to write '{}': {e}", config_path.display()))?;

    let migrations_dir = config.migrations_path(config_dir(config_path));
    if !migrations_dir.exists() && migrations_dir.extension().is_none() {
        fs::create_dir_all(&migrations_dir).map_err(|e| {
            format!(
                "Failed to create migrations directory '{}': {e}",
                migrations_dir.display()
            )
        })?;
    }
    println!("Wrote {}", config_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// migration commands
// ---------------------------------------------------------------------------

fn config_dir(config_path: &Path) -> &Path {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Loads the configuration and migrations and opens the backend.
fn open(config_path: &Path) -> Result<(Database<AnyBackend>, MigrationSet), String> {
    let config = DatabaseConfig::load(config_path)
        .map_err(|e| format!("Failed to load config '{}': {e}", config_path.display()))?;
    let migrations_path = config.migrations_path(config_dir(config_path));
    let migrations = MigrationSet::load(&migrations_path).map_err(|e| {
        format!(
            "Failed to load migrations from '{}': {e}",
            migrations_path.display()
        )
    })?;
    debug!(count = migrations.len(), latest = migrations.latest(), "migrations loaded");
    let backend = connect(&config).map_err(|e| format!("Failed to connect: {e}"))?;
    Ok((Database::new(backend), migrations))
}

fn run_migrate(config_path: &Path, args: MigrateArgs) -> Result<(), String> {
    let (mut db, migrations) = open(config_path)?;
    let mut ctx = Context::background();
    if let Some(ms) = args.timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(ms));
    }
    let report = db
        .apply_migrations(&ctx, migrations.migrations())
        .map_err(|e| format!("Migration failed: {e}"))?;
    if report.applied.is_empty() {
        println!("Schema already at version {}.", report.to);
    } else {
        println!(
            "Migrated from version {} to {} ({} applied).",
            report.from,
            report.to,
            report.applied.len()
        );
    }
    Ok(())
}

fn run_status(config_path: &Path, args: StatusArgs) -> Result<(), String> {
    let (mut db, migrations) = open(config_path)?;
    let status = db
        .migration_status(&Context::background(), migrations.migrations())
        .map_err(|e| format!("Failed to get migration status: {e}"))?;
    let report = StatusReport {
        backend: simplesql_core::Backend::name(db.backend()),
        current_version: status.current_version,
        latest_version: migrations.latest(),
        pending: status.pending,
    };

    match args.format {
        CliOutputFormat::Text => {
            println!("Migration Status:");
            println!("  Backend: {}", report.backend);
            println!("  Current version: {}", report.current_version);
            println!("  Latest version: {}", report.latest_version);
            if report.pending.is_empty() {
                println!("  Pending: none");
            } else {
                let pending: Vec<String> = report.pending.iter().map(i64::to_string).collect();
                println!("  Pending: {}", pending.join(", "));
            }
        }
        CliOutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("JSON serialization failed: {e}"))?;
            println!("{json}");
        }
        CliOutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&report)
                .map_err(|e| format!("YAML serialization failed: {e}"))?;
            print!("{yaml}");
        }
    }
    Ok(())
}

fn run_revert(config_path: &Path, args: RevertArgs) -> Result<(), String> {
    let (mut db, migrations) = open(config_path)?;
    let report = db
        .revert_migrations(&Context::background(), migrations.migrations(), args.to)
        .map_err(|e| format!("Revert failed: {e}"))?;
    if report.applied.is_empty() {
        println!("Nothing to revert; schema at version {}.", report.to);
    } else {
        println!(
            "Reverted from version {} to {} ({} reverted).",
            report.from,
            report.to,
            report.applied.len()
        );
    }
    Ok(())
}
