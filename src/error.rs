//! Error types for blockbot.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),
}

impl Error {
    /// Whether this error should stop the process rather than skip a cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) | Error::Query(_) => true,
            Error::Session(e) => e.is_fatal(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration found at {0}")]
    NotFound(PathBuf),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inbound mail session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot reach mail server {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Login failed for {username}")]
    AuthFailed { username: String },

    #[error("Mailbox \"{0}\" does not exist")]
    FolderNotFound(String),

    #[error("Network timeout: {0}")]
    Timeout(String),

    #[error("Connection lost: {0}")]
    Disconnected(String),

    #[error("Server rejected {command}: {response}")]
    Rejected { command: String, response: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl SessionError {
    /// Connection and authentication failures need operator correction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Connect { .. } | SessionError::AuthFailed { .. })
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => SessionError::Timeout(e.to_string()),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => SessionError::Disconnected(e.to_string()),
            _ => SessionError::Io(e),
        }
    }
}

/// Search expression construction errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid logic operator: {0} (expected AND or OR)")]
    InvalidOperator(String),
}

/// Archive write errors.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Cannot create archive directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write archive record {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Outbound reply errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build reply: {0}")]
    Build(String),

    #[error("SMTP relay error: {0}")]
    Relay(String),

    #[error("SMTP send failed: {0}")]
    SendFailed(String),
}
