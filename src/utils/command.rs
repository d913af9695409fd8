// mysql-resync/src/utils/command.rs
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fmt;
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{ResyncError, Result};

const REDACTED: &str = "******";
const GZIP_QUEUE_DEPTH: usize = 16;

/// An external program invocation, with the values that must never be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    secrets: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Marks a value to be masked wherever the command is displayed. The
    /// shell-quoted form is masked too, for values embedded in a remote
    /// command line.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            return self;
        }
        let quoted = crate::utils::shell_quote(&value);
        if quoted != value {
            self.secrets.push(quoted);
        }
        self.secrets.push(value);
        self
    }

    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    fn to_tokio(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&crate::utils::shell_quote(&self.redact(arg)));
        }
        f.write_str(&line)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout followed by stderr, the way a terminal would interleave them.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(err);
        }
        text
    }
}

/// Executes external commands on behalf of the orchestrator.
pub trait CommandRunner {
    /// Runs to completion and captures stdout and stderr.
    fn run(&self, command: &ExternalCommand) -> impl Future<Output = Result<CommandOutput>>;

    /// Runs to completion, gzip-compressing stdout into `destination`.
    fn run_to_gzip(
        &self,
        command: &ExternalCommand,
        destination: &Path,
    ) -> impl Future<Output = Result<CommandOutput>>;

    /// Creates a local scratch directory and its parents.
    fn create_dir_all(&self, dir: &Path) -> impl Future<Output = Result<()>>;

    /// Removes a local file; a file that is already gone is not an error.
    fn remove_file(&self, path: &Path) -> impl Future<Output = Result<()>>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn bounded<T>(
        &self,
        command: &ExternalCommand,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| ResyncError::Timeout {
                    command: command.to_string(),
                    secs: limit.as_secs(),
                })?,
            None => work.await,
        }
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &ExternalCommand) -> Result<CommandOutput> {
        debug!(command = %command, "running");
        let output = self
            .bounded(command, async {
                Ok::<_, ResyncError>(command.to_tokio().output().await?)
            })
            .await?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(command = %command, status = ?result.status, "finished");
        Ok(result)
    }

    async fn run_to_gzip(
        &self,
        command: &ExternalCommand,
        destination: &Path,
    ) -> Result<CommandOutput> {
        debug!(command = %command, destination = %destination.display(), "running into gzip file");
        let result = self
            .bounded(command, async {
                let mut child = command
                    .to_tokio()
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()?;
                let mut stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
                let mut stderr = child
                    .stderr
                    .take()
                    .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;
                let file = tokio::fs::File::create(destination).await?.into_std().await;

                // Compression and file writes stay off the runtime thread.
                let (chunks, mut received) = mpsc::channel::<Vec<u8>>(GZIP_QUEUE_DEPTH);
                let writer = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
                    let mut encoder = GzEncoder::new(file, Compression::default());
                    while let Some(chunk) = received.blocking_recv() {
                        encoder.write_all(&chunk)?;
                    }
                    encoder.finish()?.sync_all()
                });

                let pump = async move {
                    let mut buf = vec![0u8; 64 * 1024];
                    loop {
                        let n = stdout.read(&mut buf).await?;
                        if n == 0 || chunks.send(buf[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Ok::<_, std::io::Error>(())
                };
                // stderr is drained alongside stdout so a chatty dump cannot block on a full pipe.
                let collect_stderr = async move {
                    let mut text = String::new();
                    stderr.read_to_string(&mut text).await.map(|_| text)
                };

                let (pumped, stderr_text) = tokio::join!(pump, collect_stderr);
                let status = child.wait().await?;
                writer.await.map_err(std::io::Error::other)??;
                pumped?;

                Ok::<_, ResyncError>(CommandOutput {
                    status: status.code(),
                    stdout: String::new(),
                    stderr: stderr_text?,
                })
            })
            .await?;
        debug!(command = %command, status = ?result.status, "finished");
        Ok(result)
    }

    async fn create_dir_all(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_display_redacts_secrets() {
        let cmd = ExternalCommand::new("ssh")
            .arg("repl@slave")
            .arg("mysql --password=hunter2 -e 'START SLAVE;'")
            .secret("hunter2");
        let shown = cmd.to_string();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains(REDACTED));
        assert!(shown.starts_with("ssh repl@slave"));
    }

    #[test]
    fn test_combined_output_joins_streams() {
        let out = CommandOutput {
            status: Some(1),
            stdout: "partial\n".to_string(),
            stderr: "boom\n".to_string(),
        };
        assert_eq!(out.combined(), "partial\nboom");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_process_runner_captures_output_and_status() -> anyhow::Result<()> {
        let runner = ProcessRunner::default();
        let ok = runner
            .run(&ExternalCommand::new("sh").args(["-c", "echo hello"]))
            .await?;
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = runner
            .run(&ExternalCommand::new("sh").args(["-c", "echo nope >&2; exit 3"]))
            .await?;
        assert_eq!(failed.status, Some(3));
        assert_eq!(failed.stderr.trim(), "nope");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_to_gzip_compresses_stdout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("out.sql.gz");
        let runner = ProcessRunner::default();
        let out = runner
            .run_to_gzip(
                &ExternalCommand::new("sh").args(["-c", "printf 'CREATE TABLE t (id INT);\\n'"]),
                &dest,
            )
            .await?;
        assert!(out.success());

        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(&dest)?).read_to_string(&mut text)?;
        assert_eq!(text, "CREATE TABLE t (id INT);\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_to_gzip_streams_large_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("big.sql.gz");
        let out = ProcessRunner::default()
            .run_to_gzip(
                &ExternalCommand::new("sh").args(["-c", "yes 'INSERT INTO t VALUES (1);' | head -n 50000"]),
                &dest,
            )
            .await?;
        assert!(out.success());

        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(&dest)?).read_to_string(&mut text)?;
        assert_eq!(text.lines().count(), 50000);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_file_ignores_missing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let scratch = dir.path().join("nested/scratch");
        let runner = ProcessRunner::default();
        runner.create_dir_all(&scratch).await?;
        let dump = scratch.join("orders.sql.gz");
        std::fs::write(&dump, b"x")?;
        runner.remove_file(&dump).await?;
        assert!(!dump.exists());
        runner.remove_file(&dump).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(100)));
        let err = runner
            .run(&ExternalCommand::new("sh").args(["-c", "sleep 5"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ResyncError::Timeout { .. }));
    }
}
