// mysql-resync/src/resync/plan.rs
//! Dry-run collaborators: print what would be executed, change nothing.

use std::path::Path;

use crate::config::ReplicationDialect;
use crate::errors::Result;
use crate::master::{
    MasterSession, READ_LOCK_STATEMENT, ReplicationCheckpoint, UNLOCK_STATEMENT,
    reset_logs_statement, status_statement,
};
use crate::utils::command::{CommandOutput, CommandRunner, ExternalCommand};

const PLACEHOLDER_LOG_FILE: &str = "MASTER_LOG_FILE_FROM_STATUS";

fn planned() -> CommandOutput {
    CommandOutput {
        status: Some(0),
        ..CommandOutput::default()
    }
}

#[derive(Debug, Default)]
pub struct PlanRunner;

impl CommandRunner for PlanRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<CommandOutput> {
        println!("          $ {}", command);
        Ok(planned())
    }

    async fn run_to_gzip(&self, command: &ExternalCommand, destination: &Path) -> Result<CommandOutput> {
        println!("          $ {} | gzip > {}", command, destination.display());
        Ok(planned())
    }

    async fn create_dir_all(&self, dir: &Path) -> Result<()> {
        println!("          $ mkdir -p {}", dir.display());
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        println!("          $ rm -f {}", path.display());
        Ok(())
    }
}

#[derive(Debug)]
pub struct PlanMaster {
    dialect: ReplicationDialect,
}

impl PlanMaster {
    pub fn new(dialect: ReplicationDialect) -> Self {
        Self { dialect }
    }
}

impl MasterSession for PlanMaster {
    async fn lock_and_capture(&mut self) -> Result<ReplicationCheckpoint> {
        for statement in [
            reset_logs_statement(self.dialect),
            READ_LOCK_STATEMENT,
            status_statement(self.dialect),
        ] {
            println!("          master> {};", statement);
        }
        Ok(ReplicationCheckpoint {
            log_file: PLACEHOLDER_LOG_FILE.to_string(),
            log_position: 0,
        })
    }

    async fn unlock(&mut self) -> Result<()> {
        println!("          master> {};", UNLOCK_STATEMENT);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plan_runner_reports_success_without_running() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("orders.sql.gz");
        let runner = PlanRunner;
        let cmd = ExternalCommand::new("false");
        assert!(runner.run(&cmd).await?.success());
        assert!(runner.run_to_gzip(&cmd, &dest).await?.success());
        assert!(!dest.exists());

        std::fs::write(&dest, b"kept")?;
        runner.remove_file(&dest).await?;
        assert!(dest.exists());
        runner.create_dir_all(&dir.path().join("planned")).await?;
        assert!(!dir.path().join("planned").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_plan_master_returns_placeholder() -> anyhow::Result<()> {
        let mut master = PlanMaster::new(ReplicationDialect::Modern);
        let checkpoint = master.lock_and_capture().await?;
        assert_eq!(checkpoint.log_file, PLACEHOLDER_LOG_FILE);
        assert_eq!(checkpoint.log_position, 0);
        master.unlock().await?;
        Ok(())
    }
}
