//! Mailbox access for the identifier importer.
//!
//! The importer only needs "recent messages whose subject matches". The
//! `Mailbox` trait hides whether that comes from IMAP or elsewhere.

pub mod body;
pub mod imap;
pub mod token;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MailboxError;

pub use body::{MailContent, read_message};
pub use imap::{ImapConfig, ImapMailbox};
pub use token::{OAuthToken, TokenCache};

/// Which messages to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailQuery {
    /// Substring the subject must contain.
    pub subject: String,
    /// Only messages received at or after this instant.
    pub since: DateTime<Utc>,
}

/// A raw RFC 822 message as fetched from the server.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    /// Server-side identifier (IMAP UID).
    pub uid: String,
    pub raw: Vec<u8>,
}

/// Source of recent matching messages.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Authenticate and return every message matching `query`.
    ///
    /// Authentication and connection failures are errors for the whole call.
    /// Individual messages that cannot be fetched are left out.
    async fn fetch_recent(&self, query: &MailQuery) -> Result<Vec<FetchedMessage>, MailboxError>;
}
