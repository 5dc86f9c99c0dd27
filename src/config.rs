use anyhow::{Context, Result, anyhow};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::db::Database;

pub const DEFAULT_BIND: &str = "127.0.0.1:5195";
pub const DEFAULT_API: &str = "http://127.0.0.1:5195";
pub const DEFAULT_CONTACT_RETENTION: usize = 1000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub contact_retention: usize,
    pub smtp: Option<SmtpConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_string("JOBTRACK_BIND", DEFAULT_BIND)
            .parse::<SocketAddr>()
            .context("JOBTRACK_BIND must be a valid host:port")?;

        let db_path = db_path_from_env();

        let contact_retention = env_string(
            "JOBTRACK_CONTACT_RETENTION",
            &DEFAULT_CONTACT_RETENTION.to_string(),
        )
        .parse::<usize>()
        .context("JOBTRACK_CONTACT_RETENTION must be a positive integer")?;
        if contact_retention == 0 {
            return Err(anyhow!("JOBTRACK_CONTACT_RETENTION must be at least 1"));
        }

        Ok(Self {
            bind_addr,
            db_path,
            contact_retention,
            smtp: SmtpConfig::from_env()?,
        })
    }
}

/// Outbound mail settings. The password only ever comes from a file so it
/// stays out of the environment and the process list.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl SmtpConfig {
    /// `None` when `JOBTRACK_SMTP_HOST` is unset, meaning delivery is off.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(host) = std::env::var("JOBTRACK_SMTP_HOST") else {
            return Ok(None);
        };
        let port = env_string("JOBTRACK_SMTP_PORT", "587")
            .parse::<u16>()
            .context("JOBTRACK_SMTP_PORT must be a valid port")?;
        let username = required("JOBTRACK_SMTP_USERNAME")?;
        let password_file = expand_home(&required("JOBTRACK_SMTP_PASSWORD_FILE")?);
        let password = read_password_file(&password_file)?;
        let to = required("JOBTRACK_MAIL_TO")?;
        let from = std::env::var("JOBTRACK_MAIL_FROM").unwrap_or_else(|_| username.clone());

        Ok(Some(Self {
            host,
            port,
            username,
            password,
            from,
            to,
        }))
    }
}

/// `JOBTRACK_DB`, or the per-user data directory.
pub fn db_path_from_env() -> PathBuf {
    std::env::var("JOBTRACK_DB")
        .map(|raw| expand_home(&raw))
        .unwrap_or_else(|_| Database::default_path())
}

/// Where `browse` writes its logs so they stay off the terminal UI.
pub fn log_path() -> PathBuf {
    match directories::ProjectDirs::from("", "", "jobtrack") {
        Some(dirs) => dirs.data_dir().join("jobtrack.log"),
        None => PathBuf::from("jobtrack.log"),
    }
}

pub fn read_password_file(path: &Path) -> Result<String> {
    let password = fs::read_to_string(path)
        .with_context(|| format!("Failed to read password file: {}", path.display()))?;
    Ok(password.trim().to_string())
}

/// Expands a leading `~/` to `$HOME`.
pub fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(raw),
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set when JOBTRACK_SMTP_HOST is set"))
}
