//! Outbound notifications: the `Mailer` trait, SMTP transport, templates.

pub mod smtp;
pub mod template;

use async_trait::async_trait;

use crate::error::SendError;

pub use smtp::{SmtpConfig, SmtpMailer};

/// A rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    /// Plain-text body, always present.
    pub text: String,
    /// Optional HTML alternative.
    pub html: Option<String>,
}

/// Anything that can deliver an `OutgoingEmail`.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError>;
}
