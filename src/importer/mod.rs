//! Identifier importer.
//!
//! Reads recent allotment mails, extracts identifier entries and appends a
//! row for each identifier the record store does not already hold.

pub mod extract;

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::dates::TargetZone;
use crate::mailbox::{MailQuery, Mailbox, read_message};
use crate::store::record::columns;
use crate::store::{Fields, Record, RecordStore, ReminderStatus};

pub use extract::{ExtractOptions, IdentifierEntry, extract_entries, parse_line};

/// How an extracted entry is matched against existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Same code, case-insensitive.
    #[default]
    Code,
    /// Same code, or same issuer name.
    CodeOrIssuer,
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "code" => Ok(Self::Code),
            "code-or-issuer" => Ok(Self::CodeOrIssuer),
            other => Err(format!("expected `code` or `code-or-issuer`, got `{other}`")),
        }
    }
}

/// Importer settings.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub enabled: bool,
    /// Substring the message subject must contain.
    pub subject_filter: String,
    /// Trailing window in days.
    pub window_days: i64,
    pub dedup: DedupPolicy,
    pub extract: ExtractOptions,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subject_filter: "Allotment".into(),
            window_days: 7,
            dedup: DedupPolicy::default(),
            extract: ExtractOptions::default(),
        }
    }
}

/// Result of one importer pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Messages read within the window.
    pub messages: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Messages or entries skipped because of an error.
    pub failed: usize,
    /// Set when the pass could not start or the mailbox could not be read.
    pub pass_error: Option<String>,
}

/// Identifiers known to exist in the store, normalised for comparison.
#[derive(Debug, Default)]
struct KnownIdentifiers {
    codes: HashSet<String>,
    issuers: HashSet<String>,
}

impl KnownIdentifiers {
    fn absorb(&mut self, records: &[Record]) {
        for record in records {
            if let Some(code) = record.code() {
                self.codes.insert(code.to_uppercase());
            }
            if let Some(issuer) = record.issuer() {
                self.issuers.insert(issuer.to_lowercase());
            }
        }
    }

    fn remember(&mut self, entry: &IdentifierEntry) {
        self.codes.insert(entry.code.to_uppercase());
        if !entry.issuer.is_empty() {
            self.issuers.insert(entry.issuer.to_lowercase());
        }
    }

    fn contains(&self, entry: &IdentifierEntry, policy: DedupPolicy) -> bool {
        if self.codes.contains(&entry.code.to_uppercase()) {
            return true;
        }
        policy == DedupPolicy::CodeOrIssuer
            && !entry.issuer.is_empty()
            && self.issuers.contains(&entry.issuer.to_lowercase())
    }
}

/// Row fields for a newly imported identifier.
pub fn entry_fields(entry: &IdentifierEntry, allotment_date: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert(columns::IMPORT_CODE, entry.code.clone());
    if !entry.issuer.is_empty() {
        fields.insert(columns::IMPORT_ISSUER, entry.issuer.clone());
    }
    if !entry.instrument.is_empty() {
        fields.insert(columns::IMPORT_INSTRUMENT, entry.instrument.clone());
    }
    fields.insert(columns::IMPORT_ALLOTMENT_DATE, allotment_date);
    fields.insert(columns::STATUS[0], ReminderStatus::Pending.as_str());
    fields
}

/// One importer pass over a mailbox and a record store.
pub struct Importer<'a> {
    store: &'a dyn RecordStore,
    mailbox: &'a dyn Mailbox,
    config: &'a ImportConfig,
    zone: TargetZone,
}

impl<'a> Importer<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        mailbox: &'a dyn Mailbox,
        config: &'a ImportConfig,
        zone: TargetZone,
    ) -> Self {
        Self {
            store,
            mailbox,
            config,
            zone,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> ImportReport {
        let mut report = ImportReport::default();
        let Some(since) = Duration::try_days(self.config.window_days)
            .and_then(|window| now.checked_sub_signed(window))
        else {
            let message = format!(
                "import window of {} days is out of range",
                self.config.window_days
            );
            warn!("Import pass aborted: {message}");
            report.pass_error = Some(message);
            return report;
        };
        let query = MailQuery {
            subject: self.config.subject_filter.clone(),
            since,
        };

        let fetched = match self.mailbox.fetch_recent(&query).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Import pass aborted: {e}");
                report.pass_error = Some(e.to_string());
                return report;
            }
        };
        info!(count = fetched.len(), "Fetched candidate messages");

        let mut known = KnownIdentifiers::default();
        for message in &fetched {
            let content = match read_message(message) {
                Ok(content) => content,
                Err(e) => {
                    warn!("{e}");
                    report.failed += 1;
                    continue;
                }
            };
            if content.date.is_some_and(|d| d < since) {
                debug!(uid = %content.uid, "Message older than window, skipping");
                continue;
            }
            report.messages += 1;

            let entries = extract_entries(&content.body, self.config.extract);
            if entries.is_empty() {
                debug!(uid = %content.uid, subject = %content.subject, "No identifiers found");
                continue;
            }

            // Re-read the store so rows added since the last message count.
            match self.store.list_records().await {
                Ok(records) => known.absorb(&records),
                Err(e) => {
                    warn!(uid = %content.uid, "Duplicate check failed, skipping message: {e}");
                    report.failed += 1;
                    continue;
                }
            }

            let allotment_date = self
                .zone
                .date_of(content.date.unwrap_or(now))
                .format("%Y-%m-%d")
                .to_string();

            for entry in &entries {
                if known.contains(entry, self.config.dedup) {
                    info!(code = %entry.code, issuer = %entry.issuer, "Already in store, skipping");
                    report.duplicates += 1;
                    continue;
                }
                match self
                    .store
                    .create_record(&entry_fields(entry, &allotment_date))
                    .await
                {
                    Ok(record) => {
                        info!(code = %entry.code, id = %record.id, "Imported identifier");
                        known.remember(entry);
                        report.inserted += 1;
                    }
                    Err(e) => {
                        warn!(code = %entry.code, "Insert failed: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            messages = report.messages,
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed = report.failed,
            "Import pass complete"
        );
        report
    }
}
