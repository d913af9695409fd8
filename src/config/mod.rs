// mysql-resync/src/config/mod.rs
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::errors::ResyncError;

pub const DEFAULT_CONFIG_FILE: &str = "resync.json";
const DEFAULT_MASTER_URL: &str = "mysql://root@localhost:3306";
const DEFAULT_SCRATCH_DIR: &str = "/tmp";
const DEFAULT_DB_ADMIN_USER: &str = "root";
const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_MAX_ALLOWED_PACKET: u64 = 1_000_000_000;
const DEFAULT_NET_BUFFER_LENGTH: u64 = 1_000_000;

/// Which generation of replication statements the servers understand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationDialect {
    /// `SLAVE` / `MASTER` keywords (MySQL 5.x, MariaDB, MySQL 8.0 before 8.0.22).
    #[default]
    Legacy,
    /// `REPLICA` / `SOURCE` keywords (MySQL 8.4 and later).
    Modern,
}

impl std::str::FromStr for ReplicationDialect {
    type Err = ResyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "modern" => Ok(Self::Modern),
            other => Err(ResyncError::Config(format!(
                "unknown replication dialect '{}', expected 'legacy' or 'modern'",
                other
            ))),
        }
    }
}

// Structs for deserializing resync.json
#[derive(Debug, Default, Deserialize)]
pub struct JsonRemoteConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub db_admin_user: Option<String>,
    pub ssh_port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub ssh_options: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawJsonConfig {
    pub master_database_url: Option<String>,
    pub local_scratch_dir: Option<PathBuf>,
    pub remote_scratch_dir: Option<String>,
    pub max_allowed_packet: Option<u64>,
    pub net_buffer_length: Option<u64>,
    pub dialect: Option<ReplicationDialect>,
    pub command_timeout_secs: Option<u64>,
    pub remote: Option<JsonRemoteConfig>,
}

impl RawJsonConfig {
    /// Reads the JSON file. A missing file is only an error when `required`.
    pub fn load_from_json(config_path: &Path, required: bool) -> Result<Self> {
        if !config_path.exists() && !required {
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }

    /// Environment variables win over the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RESYNC_MASTER_URL") {
            self.master_database_url = Some(url);
        }
        if let Some(dir) = lookup("RESYNC_LOCAL_SCRATCH") {
            self.local_scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("RESYNC_REMOTE_SCRATCH") {
            self.remote_scratch_dir = Some(dir);
        }
        if let Some(dialect) = lookup("RESYNC_DIALECT") {
            self.dialect = Some(dialect.parse()?);
        }

        let remote = self.remote.get_or_insert_with(JsonRemoteConfig::default);
        if let Some(host) = lookup("RESYNC_REMOTE_HOST") {
            remote.host = Some(host);
        }
        if let Some(user) = lookup("RESYNC_REMOTE_USER") {
            remote.user = Some(user);
        }
        if let Some(password) = lookup("RESYNC_REMOTE_PASSWORD") {
            remote.password = Some(SecretString::new(password));
        }
        if let Some(user) = lookup("RESYNC_REMOTE_DB_USER") {
            remote.db_admin_user = Some(user);
        }
        if let Some(port) = lookup("RESYNC_REMOTE_SSH_PORT") {
            let port = port
                .trim()
                .parse()
                .with_context(|| format!("RESYNC_REMOTE_SSH_PORT is not a valid port: {}", port))?;
            remote.ssh_port = Some(port);
        }
        if let Some(identity) = lookup("RESYNC_SSH_IDENTITY") {
            remote.identity_file = Some(PathBuf::from(identity));
        }
        Ok(())
    }
}

// Application's internal configuration structs
#[derive(Debug)]
pub struct RemoteConfig {
    pub host: String,
    pub user: String,
    pub password: SecretString,
    pub db_admin_user: String,
    pub ssh_port: u16,
    pub identity_file: Option<PathBuf>,
    pub ssh_options: Vec<String>,
}

#[derive(Debug)]
pub struct AppConfig {
    pub master_database_url: String,
    pub remote: RemoteConfig,
    pub local_scratch_dir: PathBuf,
    pub remote_scratch_dir: String,
    pub max_allowed_packet: u64,
    pub net_buffer_length: u64,
    pub dialect: ReplicationDialect,
    pub command_timeout: Option<Duration>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Validates the raw configuration. Every missing required setting is
    /// reported at once.
    pub fn from_raw(raw: RawJsonConfig) -> std::result::Result<Self, ResyncError> {
        let remote = raw.remote.unwrap_or_default();
        let host = non_empty(remote.host);
        let user = non_empty(remote.user);
        let password = remote
            .password
            .filter(|p| !p.expose_secret().trim().is_empty());

        let mut missing = Vec::new();
        if host.is_none() {
            missing.push("remote.host");
        }
        if user.is_none() {
            missing.push("remote.user");
        }
        if password.is_none() {
            missing.push("remote.password");
        }
        let (Some(host), Some(user), Some(password)) = (host, user, password) else {
            return Err(ResyncError::MissingSetting(missing));
        };

        let master_database_url =
            non_empty(raw.master_database_url).unwrap_or_else(|| DEFAULT_MASTER_URL.to_string());
        let parsed = Url::parse(&master_database_url)?;
        if parsed.scheme() != "mysql" {
            return Err(ResyncError::Config(format!(
                "master_database_url must use the mysql:// scheme, got '{}://'",
                parsed.scheme()
            )));
        }

        let remote_scratch_dir = non_empty(raw.remote_scratch_dir)
            .unwrap_or_else(|| DEFAULT_SCRATCH_DIR.to_string());
        let local_scratch_dir = raw
            .local_scratch_dir
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR));

        Ok(AppConfig {
            master_database_url,
            remote: RemoteConfig {
                host,
                user,
                password,
                db_admin_user: non_empty(remote.db_admin_user)
                    .unwrap_or_else(|| DEFAULT_DB_ADMIN_USER.to_string()),
                ssh_port: remote.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
                identity_file: remote.identity_file,
                ssh_options: remote.ssh_options.unwrap_or_default(),
            },
            local_scratch_dir,
            remote_scratch_dir: remote_scratch_dir.trim_end_matches('/').to_string(),
            max_allowed_packet: raw.max_allowed_packet.unwrap_or(DEFAULT_MAX_ALLOWED_PACKET),
            net_buffer_length: raw.net_buffer_length.unwrap_or(DEFAULT_NET_BUFFER_LENGTH),
            dialect: raw.dialect.unwrap_or_default(),
            command_timeout: raw
                .command_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }

    /// File first, then `.env`/process environment on top.
    pub fn load<F>(config_path: &Path, required: bool, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut raw = RawJsonConfig::load_from_json(config_path, required)?;
        raw.apply_env(lookup)?;
        Ok(Self::from_raw(raw)?)
    }
}
