pub mod command;
pub mod disk;

use std::path::PathBuf;
use which::which;

use crate::errors::{ResyncError, Result};

/// Line the mysql client prints whenever a password is given on the command line.
const PASSWORD_WARNING: &str = "Using a password on the command line interface can be insecure";

/// Finds an executable in the system PATH.
pub fn find_executable(name: &'static str) -> Result<PathBuf> {
    which(name).map_err(|_| ResyncError::ToolNotFound(name))
}

/// Quotes a value for a POSIX shell on the remote side of `ssh`.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | ':' | '@'))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// ASCII letters, digits, `_` and `-` only.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.trim().is_empty()
        || name.contains(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
    {
        return Err(ResyncError::InvalidDatabaseName(name.to_string()));
    }
    Ok(())
}

/// Drops the mysql client's password warning from captured output.
pub fn filter_client_noise(output: &str) -> String {
    output
        .lines()
        .filter(|line| !line.contains(PASSWORD_WARNING))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_executable() {
        assert!(find_executable("sh").is_ok());
        assert!(matches!(
            find_executable("definitely-not-a-real-tool-xyz"),
            Err(ResyncError::ToolNotFound("definitely-not-a-real-tool-xyz"))
        ));
    }

    #[test]
    fn test_shell_quote_plain_values_untouched() {
        assert_eq!(shell_quote("/tmp/orders.sql.gz"), "/tmp/orders.sql.gz");
        assert_eq!(shell_quote("--user=root"), "--user=root");
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("STOP SLAVE;"), "'STOP SLAVE;'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_validate_database_name() {
        assert!(validate_database_name("orders").is_ok());
        assert!(validate_database_name("inventory_2024-v2").is_ok());
        assert!(validate_database_name("").is_err());
        assert!(validate_database_name("orders; DROP").is_err());
        assert!(validate_database_name("a.b").is_err());
    }

    #[test]
    fn test_filter_client_noise_removes_password_warning() {
        let raw = "mysql: [Warning] Using a password on the command line interface can be insecure.\nSlave_IO_Running: Yes";
        assert_eq!(filter_client_noise(raw), "Slave_IO_Running: Yes");
    }
}
