// mysql-resync/src/slave/remote.rs
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};

use crate::config::RemoteConfig;
use crate::utils::command::ExternalCommand;
use crate::utils::disk::df_args;
use crate::utils::shell_quote;

/// Builds `ssh`/`scp` invocations against the slave host.
pub struct RemoteShell<'a> {
    ssh: PathBuf,
    scp: PathBuf,
    config: &'a RemoteConfig,
}

impl<'a> RemoteShell<'a> {
    pub fn new(ssh: impl Into<PathBuf>, scp: impl Into<PathBuf>, config: &'a RemoteConfig) -> Self {
        Self {
            ssh: ssh.into(),
            scp: scp.into(),
            config,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }

    /// Options shared by ssh and scp; only the port flag differs.
    fn common_options(&self, port_flag: &str) -> Vec<String> {
        let mut opts = vec![
            port_flag.to_string(),
            self.config.ssh_port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(identity) = &self.config.identity_file {
            opts.push("-i".to_string());
            opts.push(identity.display().to_string());
        }
        for option in &self.config.ssh_options {
            opts.push("-o".to_string());
            opts.push(option.clone());
        }
        opts
    }

    /// Runs `remote_command` through the remote user's shell.
    pub fn exec(&self, remote_command: &str) -> ExternalCommand {
        ExternalCommand::new(&self.ssh)
            .args(self.common_options("-p"))
            .arg(self.destination())
            .arg(remote_command)
    }

    pub fn copy_to(&self, local: &Path, remote_path: &str) -> ExternalCommand {
        let host = if self.config.host.contains(':') {
            format!("[{}]", self.config.host)
        } else {
            self.config.host.clone()
        };
        ExternalCommand::new(&self.scp)
            .arg("-q")
            .args(self.common_options("-P"))
            .arg(local.display().to_string())
            .arg(format!("{}@{}:{}", self.config.user, host, remote_path))
    }

    fn mysql_client(&self) -> String {
        format!(
            "mysql --user={} --password={}",
            shell_quote(&self.config.db_admin_user),
            shell_quote(self.config.password.expose_secret())
        )
    }

    /// Executes SQL with the remote admin account.
    pub fn mysql(&self, sql: &str) -> ExternalCommand {
        self.exec(&format!("{} -e {}", self.mysql_client(), shell_quote(sql)))
            .secret(self.config.password.expose_secret().as_str())
    }

    /// Verifies the archive, then streams it into the target database.
    pub fn restore(&self, remote_dump: &str, database: &str) -> ExternalCommand {
        let dump = shell_quote(remote_dump);
        self.exec(&format!(
            "gunzip -t {dump} && gunzip -c {dump} | {} {}",
            self.mysql_client(),
            shell_quote(database)
        ))
        .secret(self.config.password.expose_secret().as_str())
    }

    pub fn disk_free(&self, remote_path: &str) -> ExternalCommand {
        let args: Vec<String> = df_args(remote_path).iter().map(|a| shell_quote(a)).collect();
        self.exec(&format!("df {}", args.join(" ")))
    }

    pub fn remove(&self, remote_path: &str) -> ExternalCommand {
        self.exec(&format!("rm -f {}", shell_quote(remote_path)))
    }
}
