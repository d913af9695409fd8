//! MySQL replication slave resync tool
//!
//! Locks the master, dumps the named databases, ships them to the slave over
//! SSH and repoints the slave at the captured binary log position.

// mysql-resync/src/main.rs
mod config;
mod errors;
mod master;
mod resync;
mod slave;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppConfig, DEFAULT_CONFIG_FILE};
use errors::ResyncError;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mysql-resync")]
#[command(about = "Resynchronize MySQL replication slave databases from their master", long_about = None)]
#[command(version)]
struct Cli {
    /// Databases to resync, processed in the given order
    databases: Vec<String>,

    /// Path to the JSON configuration file (default: ./resync.json, optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the commands that would run without executing anything
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Resync completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            let usage = e
                .chain()
                .filter_map(|cause| cause.downcast_ref::<ResyncError>())
                .any(ResyncError::is_usage);
            if usage {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    resync::validate_targets(&cli.databases)?;

    dotenv::dotenv().ok();
    let (config_path, required) = match cli.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let app_config = AppConfig::load(&config_path, required, |key| env::var(key).ok())
        .with_context(|| {
            format!(
                "Failed to load application configuration from {} and the environment",
                config_path.display()
            )
        })?;

    println!(
        "🚀 Resyncing {} database(s) from {} to {}@{}",
        cli.databases.len(),
        redacted_url(&app_config.master_database_url),
        app_config.remote.user,
        app_config.remote.host
    );
    resync::run_resync_flow(&app_config, &cli.databases, cli.dry_run).await
}

/// Master URL without its password, for display.
fn redacted_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("******"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_positional_databases() {
        let cli = Cli::parse_from(["mysql-resync", "--dry-run", "orders", "inventory"]);
        assert_eq!(cli.databases, vec!["orders", "inventory"]);
        assert!(cli.dry_run);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_accepts_no_databases() {
        // Rejected later with our own usage error, before any configuration is read.
        let cli = Cli::parse_from(["mysql-resync"]);
        assert!(cli.databases.is_empty());
    }

    #[tokio::test]
    async fn test_missing_databases_is_a_usage_error() {
        let cli = Cli::parse_from(["mysql-resync", "--config", "/nonexistent/resync.json"]);
        let err = run_app(cli).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResyncError>(),
            Some(ResyncError::NoDatabases)
        ));
    }

    #[test]
    fn test_redacted_url_hides_password() {
        assert_eq!(
            redacted_url("mysql://root:hunter2@db:3306"),
            "mysql://root:******@db:3306"
        );
        assert_eq!(redacted_url("mysql://root@db"), "mysql://root@db");
    }
}
