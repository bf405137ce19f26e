use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharekeeperError {
    #[error("Configuration file not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("Invalid share identity: {message}")]
    InvalidShareId { message: String },

    #[error("No login bound for homes share //{host}/{share}")]
    MissingLoginName { host: String, share: String },

    #[error("Host unreachable: {host}")]
    HostUnreachable { host: String },

    #[error("Authentication failed for //{host}/{share}")]
    AuthenticationFailed { host: String, share: String },

    #[error("An operation is already in progress for {mount_point}")]
    AlreadyInProgress { mount_point: PathBuf },

    #[error("Refusing to unmount foreign mount at {mount_point} (owned by uid {owner_uid})")]
    ForeignMountRefused {
        mount_point: PathBuf,
        owner_uid: u32,
    },

    #[error("Platform not supported: {platform}")]
    PlatformNotSupported { platform: String },

    #[error("Required tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("Mount operation failed: {message}")]
    MountOperationFailed { message: String },

    #[error("Command {command} timed out after {timeout_secs}s")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SharekeeperError {
    /// Transient failures stay silent until the retry ceiling is exhausted;
    /// everything else is surfaced on the first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(self, SharekeeperError::HostUnreachable { .. })
    }
}

pub type Result<T> = std::result::Result<T, SharekeeperError>;
