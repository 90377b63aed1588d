// Daemon configuration from TICKETLINE_* environment variables

use std::path::PathBuf;
use std::str::FromStr;
use ticketline_api_rpc::server::{DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use ticketline_core::application::constants::DEFAULT_MAX_ATTEMPTS;
use ticketline_core::error::{AppError, Result};

const DEFAULT_DB_PATH: &str = "~/.ticketline/queues.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!(
                "TICKETLINE_LOG_FORMAT must be json or pretty, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub admin_token: Option<String>,
    pub retry_attempts: u32,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank values fall back to defaults
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let db_path = get("TICKETLINE_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = PathBuf::from(shellexpand::tilde(&db_path).into_owned());

        let rpc_port = parse_or("TICKETLINE_RPC_PORT", get("TICKETLINE_RPC_PORT"), DEFAULT_RPC_PORT)?;
        let retry_attempts = parse_or(
            "TICKETLINE_RETRY_ATTEMPTS",
            get("TICKETLINE_RETRY_ATTEMPTS"),
            DEFAULT_MAX_ATTEMPTS,
        )?;
        if retry_attempts == 0 {
            return Err(AppError::Config(
                "TICKETLINE_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let log_format = match get("TICKETLINE_LOG_FORMAT") {
            Some(v) => v.parse()?,
            None => LogFormat::Pretty,
        };

        Ok(Self {
            db_path,
            rpc_host: get("TICKETLINE_RPC_HOST").unwrap_or_else(|| DEFAULT_RPC_HOST.to_string()),
            rpc_port,
            admin_token: get("TICKETLINE_ADMIN_TOKEN"),
            retry_attempts,
            log_format,
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} invalid ({}): {}", key, v, e))),
    }
}
