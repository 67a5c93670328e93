//! One run of the job: the reminder pass, then the import pass.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::JobConfig;
use crate::error::ConfigError;
use crate::importer::{ImportReport, Importer};
use crate::mailbox::{ImapMailbox, Mailbox};
use crate::notify::{Mailer, SmtpMailer};
use crate::reminders::{ReminderScanner, ScanReport};
use crate::store::{AirtableStore, RecordStore};

/// What both passes did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub reminders: ScanReport,
    /// `None` when the import pass did not run.
    pub import: Option<ImportReport>,
}

impl JobOutcome {
    /// Outcome of a run that could not start: the reminder pass counts as
    /// nothing sent and one error.
    pub fn config_failed(err: &ConfigError) -> Self {
        let reminders = ScanReport::aborted();
        error!(
            sent = reminders.sent,
            errors = reminders.errors,
            "Reminder pass not run: {err}"
        );
        Self {
            reminders,
            import: None,
        }
    }

    /// Process exit code. Only reminder errors fail the job; import
    /// problems are logged and reported but never change it.
    pub fn exit_code(&self) -> u8 {
        if self.reminders.errors == 0 { 0 } else { 1 }
    }
}

/// Run both passes against the given backends.
pub async fn run(
    config: &JobConfig,
    store: &dyn RecordStore,
    mailer: &dyn Mailer,
    mailbox: Option<&dyn Mailbox>,
    now: DateTime<Utc>,
) -> JobOutcome {
    let reminders = ReminderScanner::new(store, mailer, config.zone)
        .run(now)
        .await;

    let import = match mailbox {
        Some(mailbox) if config.import.enabled => Some(
            Importer::new(store, mailbox, &config.import, config.zone)
                .run(now)
                .await,
        ),
        _ => {
            info!("Import pass disabled");
            None
        }
    };

    let (sent, errors) = reminders.counts();
    info!(sent, errors, "Job finished");
    JobOutcome { reminders, import }
}

/// Run both passes against Airtable, SMTP and IMAP.
pub async fn execute(config: &JobConfig, now: DateTime<Utc>) -> JobOutcome {
    let store = AirtableStore::new(config.store.clone());
    let mailer = SmtpMailer::new(config.smtp.clone());
    let mailbox = ImapMailbox::new(config.mailbox.clone());
    run(config, &store, &mailer, Some(&mailbox), now).await
}
