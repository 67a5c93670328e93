//! Error types for the reminder job.
//!
//! Errors fall into three tiers: configuration errors abort before any pass,
//! pass-level errors abort a single pass, and per-unit errors are counted
//! and skipped.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Request to record store failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Record store returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid record store URL: {0}")]
    Url(String),

    #[error("Unexpected record store response: {0}")]
    Decode(String),
}

/// Outbound email errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Transport(String),
}

/// Due-date parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateParseError {
    #[error("empty date value")]
    Empty,

    #[error("unrecognised date format: {0:?}")]
    Unrecognised(String),
}

/// Mailbox errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox authentication failed: {0}")]
    Auth(String),

    #[error("Mailbox connection failed: {0}")]
    Connection(String),

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Message {id} could not be read: {reason}")]
    Message { id: String, reason: String },

    #[error("Mailbox credential error: {0}")]
    Token(#[from] TokenError),
}

impl From<std::io::Error> for MailboxError {
    fn from(e: std::io::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

/// OAuth credential cache errors.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to read token cache {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write token cache {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Token expired and no refresh token is available")]
    Expired,
}

/// Per-row errors in the reminder pass. Counted and skipped.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("Unparseable due date: {0}")]
    Date(#[from] DateParseError),

    #[error("Record has no recipient email")]
    MissingRecipient,

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Write-back failed: {0}")]
    Store(#[from] StoreError),
}
