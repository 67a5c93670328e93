//! SMTP delivery via lettre.
//!
//! Port 465 uses implicit TLS, anything else goes through STARTTLS. The
//! blocking transport runs on tokio's blocking pool.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::SendError;
use crate::notify::{Mailer, OutgoingEmail};

/// Implicit-TLS submission port.
pub const SUBMISSIONS_PORT: u16 = 465;

/// SMTP account settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Sends mail through an authenticated SMTP relay.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, SendError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let builder = if self.config.port == SUBMISSIONS_PORT {
            SmtpTransport::relay(&self.config.host)
        } else {
            SmtpTransport::starttls_relay(&self.config.host)
        }
        .map_err(|e| SendError::Transport(format!("SMTP relay error: {e}")))?;

        Ok(builder.port(self.config.port).credentials(creds).build())
    }
}

/// Build the MIME message. HTML mail becomes `multipart/alternative`.
pub fn build_message(from: &str, email: &OutgoingEmail) -> Result<Message, SendError> {
    let from: Mailbox = from.parse().map_err(|e| SendError::Address {
        address: from.to_string(),
        reason: format!("{e}"),
    })?;
    let to: Mailbox = email.to.parse().map_err(|e| SendError::Address {
        address: email.to.clone(),
        reason: format!("{e}"),
    })?;

    let builder = Message::builder().from(from).to(to).subject(&email.subject);
    match &email.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            email.text.clone(),
            html.clone(),
        )),
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(email.text.clone()),
    }
    .map_err(|e| SendError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        let message = build_message(&self.config.from_address, email)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| SendError::Transport(format!("send task failed: {e}")))?
            .map_err(|e| SendError::Transport(e.to_string()))?;

        tracing::info!(to = %email.to, "Email sent");
        Ok(())
    }
}
