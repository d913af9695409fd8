// mysql-resync/src/master/mod.rs
pub(crate) mod dump;
pub(crate) mod mysql;

use std::fmt;
use std::future::Future;

use crate::config::ReplicationDialect;
use crate::errors::Result;

/// Binary log coordinates captured on the master while it was read-locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationCheckpoint {
    pub log_file: String,
    pub log_position: u64,
}

impl fmt::Display for ReplicationCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File: {}, Position: {}", self.log_file, self.log_position)
    }
}

/// The master side of a resync.
///
/// `lock_and_capture` must reset the binary log sequence, take the global read
/// lock and read back the current coordinates on a single session, and keep
/// that session (and therefore the lock) open until `unlock` is called.
pub trait MasterSession {
    fn lock_and_capture(&mut self) -> impl Future<Output = Result<ReplicationCheckpoint>>;

    /// Releases the read lock. Calling it without a held lock is a no-op.
    fn unlock(&mut self) -> impl Future<Output = Result<()>>;
}

pub fn reset_logs_statement(dialect: ReplicationDialect) -> &'static str {
    match dialect {
        ReplicationDialect::Legacy => "RESET MASTER",
        ReplicationDialect::Modern => "RESET BINARY LOGS AND GTIDS",
    }
}

pub const READ_LOCK_STATEMENT: &str = "FLUSH TABLES WITH READ LOCK";
pub const UNLOCK_STATEMENT: &str = "UNLOCK TABLES";

pub fn status_statement(dialect: ReplicationDialect) -> &'static str {
    match dialect {
        ReplicationDialect::Legacy => "SHOW MASTER STATUS",
        ReplicationDialect::Modern => "SHOW BINARY LOG STATUS",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_follow_dialect() {
        assert_eq!(reset_logs_statement(ReplicationDialect::Legacy), "RESET MASTER");
        assert_eq!(status_statement(ReplicationDialect::Legacy), "SHOW MASTER STATUS");
        assert_eq!(
            reset_logs_statement(ReplicationDialect::Modern),
            "RESET BINARY LOGS AND GTIDS"
        );
        assert_eq!(status_statement(ReplicationDialect::Modern), "SHOW BINARY LOG STATUS");
    }

    #[test]
    fn test_checkpoint_display() {
        let checkpoint = ReplicationCheckpoint {
            log_file: "mysql-bin.000001".to_string(),
            log_position: 154,
        };
        assert_eq!(checkpoint.to_string(), "File: mysql-bin.000001, Position: 154");
    }
}
