use thiserror::Error;

use crate::resync::steps::Step;

#[derive(Error, Debug)]
pub enum ResyncError {
    #[error("Usage: mysql-resync [OPTIONS] <DATABASE>... (at least one database name is required)")]
    NoDatabases,

    #[error("Invalid database name '{0}': only letters, digits, '_' and '-' are allowed")]
    InvalidDatabaseName(String),

    #[error("Missing required setting(s): {}", .0.join(", "))]
    MissingSetting(Vec<&'static str>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} executable not found in PATH")]
    ToolNotFound(&'static str),

    #[error("Step {} ({}) failed for database '{database}'{}: {output}",
        .step.number(),
        .step.label(),
        .status.map(|code| format!(" with exit status {}", code)).unwrap_or_default())]
    StepFailed {
        step: Step,
        database: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Master returned an unexpected status: {0}")]
    MasterStatus(String),

    #[error("Command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl ResyncError {
    /// Errors reported before any external call is made.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ResyncError::NoDatabases
                | ResyncError::InvalidDatabaseName(_)
                | ResyncError::MissingSetting(_)
                | ResyncError::Config(_)
                | ResyncError::ToolNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ResyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failure_message_includes_status() {
        let err = ResyncError::StepFailed {
            step: Step::TransferDump,
            database: "orders".to_string(),
            status: Some(255),
            output: "Connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Step 6"));
        assert!(msg.contains("orders"));
        assert!(msg.contains("exit status 255"));
        assert!(msg.contains("Connection refused"));
        assert!(!err.is_usage());
    }

    #[test]
    fn test_missing_settings_are_listed() {
        let err = ResyncError::MissingSetting(vec!["remote.host", "remote.password"]);
        assert_eq!(
            err.to_string(),
            "Missing required setting(s): remote.host, remote.password"
        );
        assert!(err.is_usage());
    }
}
