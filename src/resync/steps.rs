// mysql-resync/src/resync/steps.rs

/// The fixed per-database pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    CheckLocalDisk,
    LockMaster,
    DumpDatabase,
    UnlockMaster,
    CheckRemoteDisk,
    TransferDump,
    StopSlave,
    RaisePacketSize,
    RestoreDump,
    RepositionSlave,
    StartSlave,
    CheckSlaveStatus,
    Cleanup,
}

impl Step {
    pub const ALL: [Step; 13] = [
        Step::CheckLocalDisk,
        Step::LockMaster,
        Step::DumpDatabase,
        Step::UnlockMaster,
        Step::CheckRemoteDisk,
        Step::TransferDump,
        Step::StopSlave,
        Step::RaisePacketSize,
        Step::RestoreDump,
        Step::RepositionSlave,
        Step::StartSlave,
        Step::CheckSlaveStatus,
        Step::Cleanup,
    ];

    pub fn number(self) -> usize {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .map_or(0, |i| i + 1)
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::CheckLocalDisk => "Checking local disk space",
            Step::LockMaster => "Locking master and reading binary log position",
            Step::DumpDatabase => "Dumping database from master",
            Step::UnlockMaster => "Unlocking master",
            Step::CheckRemoteDisk => "Checking slave disk space",
            Step::TransferDump => "Copying dump to slave",
            Step::StopSlave => "Stopping slave replication",
            Step::RaisePacketSize => "Raising slave packet size limits",
            Step::RestoreDump => "Restoring dump on slave",
            Step::RepositionSlave => "Resetting slave to master position",
            Step::StartSlave => "Starting slave replication",
            Step::CheckSlaveStatus => "Checking slave replication threads",
            Step::Cleanup => "Removing dump files",
        }
    }

    /// Disk probes only report; their failure never stops the run.
    #[cfg(test)]
    pub fn is_informational(self) -> bool {
        matches!(self, Step::CheckLocalDisk | Step::CheckRemoteDisk)
    }

    /// State a database is in once this step has completed.
    pub fn completes(self) -> PipelineState {
        match self {
            Step::CheckLocalDisk => PipelineState::DiskCheckedMaster,
            Step::LockMaster => PipelineState::MasterLocked,
            Step::DumpDatabase => PipelineState::Dumped,
            Step::UnlockMaster => PipelineState::MasterUnlocked,
            Step::CheckRemoteDisk => PipelineState::DiskCheckedSlave,
            Step::TransferDump => PipelineState::Transferred,
            Step::StopSlave => PipelineState::SlaveStopped,
            Step::RaisePacketSize => PipelineState::PacketSizeRaised,
            Step::RestoreDump => PipelineState::Restored,
            Step::RepositionSlave => PipelineState::Repositioned,
            Step::StartSlave => PipelineState::SlaveStarted,
            Step::CheckSlaveStatus => PipelineState::StatusChecked,
            Step::Cleanup => PipelineState::CleanedUp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    DiskCheckedMaster,
    MasterLocked,
    Dumped,
    MasterUnlocked,
    DiskCheckedSlave,
    Transferred,
    SlaveStopped,
    PacketSizeRaised,
    Restored,
    Repositioned,
    SlaveStarted,
    StatusChecked,
    CleanedUp,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::CleanedUp | PipelineState::Failed)
    }

    /// Next step to run from this state, if any.
    pub fn next_step(self) -> Option<Step> {
        match self {
            PipelineState::NotStarted => Some(Step::CheckLocalDisk),
            PipelineState::Failed | PipelineState::CleanedUp => None,
            state => Step::ALL
                .iter()
                .position(|s| s.completes() == state)
                .and_then(|i| Step::ALL.get(i + 1).copied()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_numbered_in_order() {
        for (i, step) in Step::ALL.iter().enumerate() {
            assert_eq!(step.number(), i + 1);
        }
        assert_eq!(Step::Cleanup.number(), 13);
    }

    #[test]
    fn test_only_disk_checks_are_informational() {
        let informational: Vec<Step> = Step::ALL
            .into_iter()
            .filter(|s| s.is_informational())
            .collect();
        assert_eq!(informational, vec![Step::CheckLocalDisk, Step::CheckRemoteDisk]);
    }

    #[test]
    fn test_state_machine_walks_every_step() {
        let mut state = PipelineState::NotStarted;
        let mut walked = Vec::new();
        while let Some(step) = state.next_step() {
            walked.push(step);
            state = step.completes();
        }
        assert_eq!(walked, Step::ALL.to_vec());
        assert_eq!(state, PipelineState::CleanedUp);
        assert!(state.is_terminal());
        assert_eq!(PipelineState::Failed.next_step(), None);
    }
}
