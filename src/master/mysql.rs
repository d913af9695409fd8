// mysql-resync/src/master/mysql.rs
use sqlx::mysql::MySqlRow;
use sqlx::{Connection, Executor, MySqlConnection, Row};
use tracing::{debug, warn};

use super::{
    MasterSession, READ_LOCK_STATEMENT, ReplicationCheckpoint, UNLOCK_STATEMENT,
    reset_logs_statement, status_statement,
};
use crate::config::ReplicationDialect;
use crate::errors::{ResyncError, Result};

/// Master session over a dedicated sqlx connection.
///
/// Statements are sent as plain `&str` so they go over the text protocol;
/// `FLUSH TABLES WITH READ LOCK` and friends are not all preparable on every
/// server version.
pub struct MySqlMaster {
    url: String,
    dialect: ReplicationDialect,
    conn: Option<MySqlConnection>,
}

impl MySqlMaster {
    pub fn new(url: impl Into<String>, dialect: ReplicationDialect) -> Self {
        Self {
            url: url.into(),
            dialect,
            conn: None,
        }
    }
}

impl MasterSession for MySqlMaster {
    async fn lock_and_capture(&mut self) -> Result<ReplicationCheckpoint> {
        if self.conn.is_some() {
            return Err(ResyncError::MasterStatus(
                "read lock is already held by this session".to_string(),
            ));
        }

        let mut conn = MySqlConnection::connect(&self.url).await?;
        conn.execute(reset_logs_statement(self.dialect)).await?;
        conn.execute(READ_LOCK_STATEMENT).await?;
        debug!("global read lock acquired");

        // Keep the session before reading the status so unlock() can still
        // release the lock if the read fails.
        let conn = self.conn.insert(conn);
        let row = conn
            .fetch_optional(status_statement(self.dialect))
            .await?
            .ok_or_else(|| {
                ResyncError::MasterStatus(
                    "no binary log status returned; is log_bin enabled on the master?".to_string(),
                )
            })?;
        checkpoint_from_row(&row)
    }

    async fn unlock(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let unlocked = conn.execute(UNLOCK_STATEMENT).await.map(|_| ());
        // The server drops the lock with the session, so close even when
        // UNLOCK TABLES failed.
        if let Err(e) = conn.close().await {
            warn!("Failed to close master session cleanly: {}", e);
        }
        unlocked?;
        debug!("global read lock released");
        Ok(())
    }
}

fn checkpoint_from_row(row: &MySqlRow) -> Result<ReplicationCheckpoint> {
    let log_file = if let Ok(file) = row.try_get::<String, _>("File") {
        file
    } else if let Ok(bytes) = row.try_get::<Vec<u8>, _>("File") {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        return Err(ResyncError::MasterStatus(
            "status row has no readable 'File' column".to_string(),
        ));
    };

    // Position comes back as BIGINT UNSIGNED on MySQL, BIGINT on some forks.
    let log_position = if let Ok(pos) = row.try_get::<u64, _>("Position") {
        pos
    } else if let Ok(pos) = row.try_get::<i64, _>("Position") {
        u64::try_from(pos).map_err(|_| {
            ResyncError::MasterStatus(format!("negative binary log position {}", pos))
        })?
    } else {
        return Err(ResyncError::MasterStatus(
            "status row has no readable 'Position' column".to_string(),
        ));
    };

    parse_checkpoint(&log_file, &log_position.to_string())
}

/// Validates coordinates before they are spliced into CHANGE MASTER on the slave.
pub fn parse_checkpoint(log_file: &str, log_position: &str) -> Result<ReplicationCheckpoint> {
    if log_file.is_empty()
        || !log_file
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ResyncError::MasterStatus(format!(
            "unexpected binary log file name '{}'",
            log_file
        )));
    }
    let log_position = log_position.trim().parse::<u64>().map_err(|_| {
        ResyncError::MasterStatus(format!("unexpected binary log position '{}'", log_position))
    })?;
    Ok(ReplicationCheckpoint {
        log_file: log_file.to_string(),
        log_position,
    })
}
