// mysql-resync/src/resync/mod.rs
pub(crate) mod logic;
pub(crate) mod plan;
pub(crate) mod steps;
pub(crate) mod transcript;

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::master::mysql::MySqlMaster;
use crate::utils::command::ProcessRunner;
use crate::utils::{find_executable, validate_database_name};
use crate::errors::ResyncError;
use logic::Orchestrator;
use plan::{PlanMaster, PlanRunner};
use transcript::Transcript;

/// Local executables the pipeline shells out to.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub mysqldump: PathBuf,
    pub ssh: PathBuf,
    pub scp: PathBuf,
    pub df: PathBuf,
}

impl Toolchain {
    pub fn discover() -> crate::errors::Result<Self> {
        Ok(Self {
            mysqldump: find_executable("mysqldump")?,
            ssh: find_executable("ssh")?,
            scp: find_executable("scp")?,
            df: find_executable("df")?,
        })
    }

    /// Bare program names, resolved by the OS at spawn time.
    pub fn by_name() -> Self {
        Self {
            mysqldump: PathBuf::from("mysqldump"),
            ssh: PathBuf::from("ssh"),
            scp: PathBuf::from("scp"),
            df: PathBuf::from("df"),
        }
    }
}

/// Checks the positional arguments before anything else happens.
pub fn validate_targets(databases: &[String]) -> crate::errors::Result<()> {
    if databases.is_empty() {
        return Err(ResyncError::NoDatabases);
    }
    databases.iter().try_for_each(|db| validate_database_name(db))
}

/// Public entry point for the resync process.
pub async fn run_resync_flow(app_config: &AppConfig, databases: &[String], dry_run: bool) -> Result<()> {
    validate_targets(databases)?;

    if dry_run {
        println!("📝 Dry run: nothing will be executed.");
        let tools = Toolchain::discover().unwrap_or_else(|_| Toolchain::by_name());
        let mut orchestrator = Orchestrator::new(
            app_config,
            &tools,
            PlanRunner,
            PlanMaster::new(app_config.dialect),
            Transcript::stdout(),
        );
        orchestrator.run(databases).await?;
        return Ok(());
    }

    let tools = Toolchain::discover()?;
    let mut orchestrator = Orchestrator::new(
        app_config,
        &tools,
        ProcessRunner::new(app_config.command_timeout),
        MySqlMaster::new(app_config.master_database_url.clone(), app_config.dialect),
        Transcript::stdout(),
    );
    let outcomes = orchestrator
        .run(databases)
        .await
        .context("Resync process failed")?;

    println!("\nSummary:");
    for outcome in &outcomes {
        println!(
            "  {:<24} {:?}  {}",
            outcome.database, outcome.state, outcome.checkpoint
        );
    }
    Ok(())
}
