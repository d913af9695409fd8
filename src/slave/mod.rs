// mysql-resync/src/slave/mod.rs
pub(crate) mod remote;

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::config::ReplicationDialect;
use crate::master::ReplicationCheckpoint;

/// Replication control statements for the slave, in the server's dialect.
#[derive(Debug, Clone, Copy)]
pub struct SlaveStatements {
    dialect: ReplicationDialect,
}

impl SlaveStatements {
    pub fn new(dialect: ReplicationDialect) -> Self {
        Self { dialect }
    }

    pub fn stop(&self) -> String {
        match self.dialect {
            ReplicationDialect::Legacy => "STOP SLAVE;".to_string(),
            ReplicationDialect::Modern => "STOP REPLICA;".to_string(),
        }
    }

    pub fn start(&self) -> String {
        match self.dialect {
            ReplicationDialect::Legacy => "START SLAVE;".to_string(),
            ReplicationDialect::Modern => "START REPLICA;".to_string(),
        }
    }

    pub fn raise_packet_size(&self, max_allowed_packet: u64, net_buffer_length: u64) -> String {
        format!(
            "SET GLOBAL max_allowed_packet={}; SET GLOBAL net_buffer_length={};",
            max_allowed_packet, net_buffer_length
        )
    }

    pub fn reset_and_reposition(&self, checkpoint: &ReplicationCheckpoint) -> String {
        let file = sql_string(&checkpoint.log_file);
        match self.dialect {
            ReplicationDialect::Legacy => format!(
                "RESET SLAVE; CHANGE MASTER TO MASTER_LOG_FILE={}, MASTER_LOG_POS={};",
                file, checkpoint.log_position
            ),
            ReplicationDialect::Modern => format!(
                "RESET REPLICA; CHANGE REPLICATION SOURCE TO SOURCE_LOG_FILE={}, SOURCE_LOG_POS={};",
                file, checkpoint.log_position
            ),
        }
    }

    pub fn status(&self) -> String {
        match self.dialect {
            ReplicationDialect::Legacy => r"SHOW SLAVE STATUS\G".to_string(),
            ReplicationDialect::Modern => r"SHOW REPLICA STATUS\G".to_string(),
        }
    }

    /// Status fields telling whether the I/O and SQL threads run.
    pub fn running_fields(&self) -> (&'static str, &'static str) {
        match self.dialect {
            ReplicationDialect::Legacy => ("Slave_IO_Running", "Slave_SQL_Running"),
            ReplicationDialect::Modern => ("Replica_IO_Running", "Replica_SQL_Running"),
        }
    }
}

fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', "''"))
}

/// Parses `\G` vertical output into field/value pairs.
pub fn parse_vertical_status(output: &str) -> BTreeMap<String, String> {
    static FIELD: OnceLock<Regex> = OnceLock::new();
    let field = FIELD.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*):\s?(.*)$").expect("static regex is valid")
    });

    output
        .lines()
        .filter_map(|line| field.captures(line))
        .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
        .collect()
}

/// Running state of the replication threads as reported by the slave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStatus {
    pub io_field: &'static str,
    pub io_running: Option<String>,
    pub sql_field: &'static str,
    pub sql_running: Option<String>,
}

impl ThreadStatus {
    pub fn from_output(statements: &SlaveStatements, output: &str) -> Self {
        let fields = parse_vertical_status(output);
        let (io_field, sql_field) = statements.running_fields();
        Self {
            io_field,
            io_running: fields.get(io_field).cloned(),
            sql_field,
            sql_running: fields.get(sql_field).cloned(),
        }
    }

    pub fn both_running(&self) -> bool {
        let yes = |v: &Option<String>| v.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("Yes"));
        yes(&self.io_running) && yes(&self.sql_running)
    }

    /// One line per thread, in the same `Field: Value` shape the server prints.
    pub fn report_lines(&self) -> Vec<String> {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "<not reported>".to_string());
        vec![
            format!("{}: {}", self.io_field, show(&self.io_running)),
            format!("{}: {}", self.sql_field, show(&self.sql_running)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLAVE_STATUS: &str = r"*************************** 1. row ***************************
               Slave_IO_State: Waiting for master to send event
                  Master_Host: db-master
              Master_Log_File: mysql-bin.000001
          Read_Master_Log_Pos: 154
             Slave_IO_Running: Yes
            Slave_SQL_Running: Yes
                   Last_Error:
";

    fn checkpoint() -> ReplicationCheckpoint {
        ReplicationCheckpoint {
            log_file: "mysql-bin.000001".to_string(),
            log_position: 154,
        }
    }

    #[test]
    fn test_legacy_statements() {
        let s = SlaveStatements::new(ReplicationDialect::Legacy);
        assert_eq!(s.stop(), "STOP SLAVE;");
        assert_eq!(s.start(), "START SLAVE;");
        assert_eq!(
            s.reset_and_reposition(&checkpoint()),
            "RESET SLAVE; CHANGE MASTER TO MASTER_LOG_FILE='mysql-bin.000001', MASTER_LOG_POS=154;"
        );
        assert_eq!(s.status(), r"SHOW SLAVE STATUS\G");
    }

    #[test]
    fn test_modern_statements() {
        let s = SlaveStatements::new(ReplicationDialect::Modern);
        assert_eq!(s.stop(), "STOP REPLICA;");
        assert_eq!(
            s.reset_and_reposition(&checkpoint()),
            "RESET REPLICA; CHANGE REPLICATION SOURCE TO SOURCE_LOG_FILE='mysql-bin.000001', SOURCE_LOG_POS=154;"
        );
        assert_eq!(s.running_fields(), ("Replica_IO_Running", "Replica_SQL_Running"));
    }

    #[test]
    fn test_raise_packet_size() {
        let s = SlaveStatements::new(ReplicationDialect::Legacy);
        assert_eq!(
            s.raise_packet_size(1_000_000_000, 1_000_000),
            "SET GLOBAL max_allowed_packet=1000000000; SET GLOBAL net_buffer_length=1000000;"
        );
    }

    #[test]
    fn test_parse_vertical_status() {
        let fields = parse_vertical_status(SLAVE_STATUS);
        assert_eq!(fields.get("Master_Host").map(String::as_str), Some("db-master"));
        assert_eq!(fields.get("Read_Master_Log_Pos").map(String::as_str), Some("154"));
        assert_eq!(fields.get("Last_Error").map(String::as_str), Some(""));
        assert!(!fields.contains_key("*************************** 1. row"));
    }

    #[test]
    fn test_thread_status_running() {
        let s = SlaveStatements::new(ReplicationDialect::Legacy);
        let status = ThreadStatus::from_output(&s, SLAVE_STATUS);
        assert!(status.both_running());
        assert_eq!(
            status.report_lines(),
            vec!["Slave_IO_Running: Yes", "Slave_SQL_Running: Yes"]
        );
    }

    #[test]
    fn test_thread_status_missing_fields() {
        let s = SlaveStatements::new(ReplicationDialect::Legacy);
        let status = ThreadStatus::from_output(&s, "Slave_IO_Running: Connecting\n");
        assert!(!status.both_running());
        assert_eq!(status.report_lines()[1], "Slave_SQL_Running: <not reported>");
    }
}
