// mysql-resync/src/resync/logic.rs
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Toolchain, validate_targets};
use super::steps::{PipelineState, Step};
use super::transcript::Transcript;
use crate::config::AppConfig;
use crate::errors::{ResyncError, Result};
use crate::master::dump::dump_command;
use crate::master::{MasterSession, ReplicationCheckpoint};
use crate::slave::remote::RemoteShell;
use crate::slave::{SlaveStatements, ThreadStatus};
use crate::utils::command::{CommandOutput, CommandRunner, ExternalCommand};
use crate::utils::disk::{df_args, parse_df_output};
use crate::utils::filter_client_noise;

/// Result of one database's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOutcome {
    pub database: String,
    pub state: PipelineState,
    pub checkpoint: ReplicationCheckpoint,
}

/// Dump files that exist (or may partially exist) and must not be left behind.
#[derive(Debug, Default)]
struct Artifacts {
    local: Option<PathBuf>,
    remote: Option<String>,
}

fn step_failed(step: Step, database: &str, status: Option<i32>, output: impl Into<String>) -> ResyncError {
    ResyncError::StepFailed {
        step,
        database: database.to_string(),
        status,
        output: output.into(),
    }
}

/// Runs the resync pipeline, one database at a time, stopping at the first
/// failure.
pub struct Orchestrator<'a, R, M> {
    config: &'a AppConfig,
    tools: &'a Toolchain,
    runner: R,
    master: M,
    transcript: Transcript,
    state: PipelineState,
    running: Option<Step>,
}

impl<'a, R, M> Orchestrator<'a, R, M>
where
    R: CommandRunner,
    M: MasterSession,
{
    pub fn new(
        config: &'a AppConfig,
        tools: &'a Toolchain,
        runner: R,
        master: M,
        transcript: Transcript,
    ) -> Self {
        Self {
            config,
            tools,
            runner,
            master,
            transcript,
            state: PipelineState::NotStarted,
            running: None,
        }
    }

    #[cfg(test)]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[cfg(test)]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[cfg(test)]
    pub fn master(&self) -> &M {
        &self.master
    }

    fn remote(&self) -> RemoteShell<'a> {
        RemoteShell::new(&self.tools.ssh, &self.tools.scp, &self.config.remote)
    }

    /// Marks the running step complete and starts `step`.
    fn begin(&mut self, step: Step) {
        self.finish_step();
        debug_assert_eq!(self.state.next_step(), Some(step), "steps must run in order");
        self.running = Some(step);
        self.transcript.step(step);
    }

    fn finish_step(&mut self) {
        if let Some(done) = self.running.take() {
            self.state = done.completes();
            debug!(state = ?self.state, "step completed");
        }
    }

    fn statements(&self) -> SlaveStatements {
        SlaveStatements::new(self.config.dialect)
    }

    pub async fn run(&mut self, databases: &[String]) -> Result<Vec<DatabaseOutcome>> {
        validate_targets(databases)?;
        self.runner
            .create_dir_all(&self.config.local_scratch_dir)
            .await?;

        let mut outcomes = Vec::with_capacity(databases.len());
        for (index, database) in databases.iter().enumerate() {
            self.transcript
                .database_started(database, index + 1, databases.len());
            let started = Local::now();

            let result = self.resync_database(database).await;
            debug_assert!(self.state.is_terminal());
            match result {
                Ok(checkpoint) => {
                    self.transcript
                        .database_finished(database, Local::now() - started);
                    outcomes.push(DatabaseOutcome {
                        database: database.clone(),
                        state: self.state,
                        checkpoint,
                    });
                }
                Err(e) => {
                    self.transcript.database_failed(database, &e.to_string());
                    let skipped = &databases[index + 1..];
                    if !skipped.is_empty() {
                        warn!("Not processed because of the failure: {:?}", skipped);
                    }
                    return Err(e);
                }
            }
        }
        Ok(outcomes)
    }

    async fn resync_database(&mut self, database: &str) -> Result<ReplicationCheckpoint> {
        self.state = PipelineState::NotStarted;
        self.running = None;

        let mut artifacts = Artifacts::default();
        let result = self.pipeline(database, &mut artifacts).await;
        if result.is_err() {
            self.running = None;
            self.state = PipelineState::Failed;
            self.cleanup_after_failure(&artifacts).await;
        }
        result
    }

    async fn pipeline(
        &mut self,
        database: &str,
        artifacts: &mut Artifacts,
    ) -> Result<ReplicationCheckpoint> {
        let file_name = format!("{}.sql.gz", database);
        let local_dump = self.config.local_scratch_dir.join(&file_name);
        let remote_dump = format!("{}/{}", self.config.remote_scratch_dir, file_name);
        let remote = self.remote();
        let statements = self.statements();

        // 1
        self.begin(Step::CheckLocalDisk);
        let local_df = ExternalCommand::new(&self.tools.df)
            .args(df_args(&self.config.local_scratch_dir.display().to_string()));
        self.report_disk(&local_df).await;

        // 2-4
        let checkpoint = self.snapshot_master(database, &local_dump, artifacts).await?;

        // 5
        self.begin(Step::CheckRemoteDisk);
        self.report_disk(&remote.disk_free(&self.config.remote_scratch_dir))
            .await;

        // 6
        self.begin(Step::TransferDump);
        artifacts.remote = Some(remote_dump.clone());
        self.run_step(Step::TransferDump, database, &remote.copy_to(&local_dump, &remote_dump))
            .await?;
        self.transcript
            .detail(format!("{}@{}:{}", self.config.remote.user, self.config.remote.host, remote_dump));

        // 7
        self.begin(Step::StopSlave);
        self.run_step(Step::StopSlave, database, &remote.mysql(&statements.stop()))
            .await?;

        // 8
        self.begin(Step::RaisePacketSize);
        let raise = statements
            .raise_packet_size(self.config.max_allowed_packet, self.config.net_buffer_length);
        self.run_step(Step::RaisePacketSize, database, &remote.mysql(&raise))
            .await?;

        // 9
        self.begin(Step::RestoreDump);
        self.run_step(Step::RestoreDump, database, &remote.restore(&remote_dump, database))
            .await?;

        // 10
        self.begin(Step::RepositionSlave);
        let reposition = statements.reset_and_reposition(&checkpoint);
        self.run_step(Step::RepositionSlave, database, &remote.mysql(&reposition))
            .await?;
        self.transcript.detail(checkpoint.to_string());

        // 11
        self.begin(Step::StartSlave);
        self.run_step(Step::StartSlave, database, &remote.mysql(&statements.start()))
            .await?;

        // 12
        self.begin(Step::CheckSlaveStatus);
        let output = self
            .run_step(Step::CheckSlaveStatus, database, &remote.mysql(&statements.status()))
            .await?;
        let threads = ThreadStatus::from_output(&statements, &filter_client_noise(&output.stdout));
        for line in threads.report_lines() {
            self.transcript.detail(line);
        }
        if !threads.both_running() {
            warn!("Replication threads for {} are not both running: {:?}", database, threads);
        }

        // 13
        self.begin(Step::Cleanup);
        self.run_step(Step::Cleanup, database, &remote.remove(&remote_dump))
            .await?;
        artifacts.remote = None;
        self.runner
            .remove_file(&local_dump)
            .await
            .map_err(|e| step_failed(Step::Cleanup, database, None, e.to_string()))?;
        artifacts.local = None;

        self.finish_step();
        info!(database, %checkpoint, "resync finished");
        Ok(checkpoint)
    }

    /// Steps 2 to 4. The read lock is released on every path once taken.
    async fn snapshot_master(
        &mut self,
        database: &str,
        local_dump: &Path,
        artifacts: &mut Artifacts,
    ) -> Result<ReplicationCheckpoint> {
        self.begin(Step::LockMaster);
        let captured = self.master.lock_and_capture().await;
        let dumped = match captured {
            Ok(checkpoint) => {
                self.transcript.detail(checkpoint.to_string());
                self.begin(Step::DumpDatabase);
                artifacts.local = Some(local_dump.to_path_buf());
                self.dump(database, local_dump).await.map(|_| checkpoint)
            }
            Err(e) => Err(step_failed(Step::LockMaster, database, None, e.to_string())),
        };

        match dumped {
            Ok(checkpoint) => {
                self.begin(Step::UnlockMaster);
                self.master
                    .unlock()
                    .await
                    .map_err(|e| step_failed(Step::UnlockMaster, database, None, e.to_string()))?;
                Ok(checkpoint)
            }
            Err(e) => {
                let unlocked = self.master.unlock().await;
                match unlocked {
                    Ok(()) => self.transcript.warn("Master read lock released after failure"),
                    Err(unlock_err) => {
                        warn!("Failed to release master read lock: {}", unlock_err);
                        self.transcript
                            .warn(format!("Could not release master read lock: {}", unlock_err));
                    }
                }
                Err(e)
            }
        }
    }

    async fn dump(&mut self, database: &str, local_dump: &Path) -> Result<()> {
        let command = dump_command(&self.tools.mysqldump, &self.config.master_database_url, database)
            .map_err(|e| step_failed(Step::DumpDatabase, database, None, e.to_string()))?;
        let output = self
            .runner
            .run_to_gzip(&command, local_dump)
            .await
            .map_err(|e| step_failed(Step::DumpDatabase, database, None, e.to_string()))?;
        if !output.success() {
            return Err(step_failed(
                Step::DumpDatabase,
                database,
                output.status,
                filter_client_noise(&output.combined()),
            ));
        }
        let size = tokio::fs::metadata(local_dump).await.map(|m| m.len()).unwrap_or(0);
        self.transcript
            .detail(format!("{} ({} bytes compressed)", local_dump.display(), size));
        Ok(())
    }

    async fn run_step(
        &self,
        step: Step,
        database: &str,
        command: &ExternalCommand,
    ) -> Result<CommandOutput> {
        let output = self
            .runner
            .run(command)
            .await
            .map_err(|e| step_failed(step, database, None, e.to_string()))?;
        if !output.success() {
            return Err(step_failed(
                step,
                database,
                output.status,
                filter_client_noise(&output.combined()),
            ));
        }
        Ok(output)
    }

    /// Disk probes never fail the run.
    async fn report_disk(&mut self, command: &ExternalCommand) {
        let result = self.runner.run(command).await;
        match result {
            Ok(output) if output.success() => match parse_df_output(&output.stdout) {
                Some(usage) => self.transcript.detail(usage.to_string()),
                None => self.transcript.detail(filter_client_noise(&output.stdout)),
            },
            Ok(output) => self.transcript.warn(format!(
                "disk space check failed (exit status {:?}): {}",
                output.status,
                filter_client_noise(&output.combined())
            )),
            Err(e) => self.transcript.warn(format!("disk space check failed: {}", e)),
        }
    }

    async fn cleanup_after_failure(&mut self, artifacts: &Artifacts) {
        if let Some(remote_dump) = &artifacts.remote {
            let command = self.remote().remove(remote_dump);
            let result = self.runner.run(&command).await;
            match result {
                Ok(output) if output.success() => self
                    .transcript
                    .warn(format!("Removed {} from slave after failure", remote_dump)),
                Ok(output) => self.transcript.warn(format!(
                    "Could not remove {} from slave: {}",
                    remote_dump,
                    filter_client_noise(&output.combined())
                )),
                Err(e) => self
                    .transcript
                    .warn(format!("Could not remove {} from slave: {}", remote_dump, e)),
            }
        }
        if let Some(local_dump) = &artifacts.local {
            let removed = self.runner.remove_file(local_dump).await;
            if let Err(e) = removed {
                self.transcript
                    .warn(format!("Could not remove {}: {}", local_dump.display(), e));
            }
        }
    }
}
