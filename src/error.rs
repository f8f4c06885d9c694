use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config {0} already exists (pass --force to overwrite)")]
    AlreadyExists(PathBuf),
    #[error("no config directory on this platform; pass --config")]
    NoConfigDir,
    #[error("invalid environment value {name}={value}")]
    InvalidEnv { name: String, value: String },
    #[error("failed to write config: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub(crate) enum ModelError {
    #[error("model is not configured: {0}")]
    MissingConfig(String),
    #[error("model API returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("model API transport error: {0}")]
    Transport(String),
    #[error("malformed model response: {0}")]
    Malformed(String),
    #[error("model hook failed: {0}")]
    Hook(String),
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum HistoryError {
    #[error("a system message may only appear once, as the first message")]
    MisplacedSystem,
    #[error("tool result {0} does not answer an invocation of the preceding assistant message")]
    OrphanToolResult(String),
    #[error("tool invocation {0} was already answered")]
    DuplicateToolResult(String),
    #[error("pending invocation {0} is not an unanswered call of the last assistant message")]
    StalePending(String),
}

#[derive(Debug, Error)]
pub(crate) enum AgentError {
    #[error("an approval is pending; approve or reject it first")]
    Busy,
    #[error("there is no pending approval to decide on")]
    NoPendingApproval,
    #[error(transparent)]
    History(#[from] HistoryError),
}

#[derive(Debug, Error)]
pub(crate) enum ArchiveError {
    #[error("archive database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("archive document error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid archived session {id}: {reason}")]
    Corrupt { id: String, reason: String },
}
