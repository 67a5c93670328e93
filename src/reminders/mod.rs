//! Reminder scanner.
//!
//! Each record is either in status mode (a single due date and a
//! `Pending`/`Sent`/`Error` status) or in schedule mode (numbered date
//! columns and a sent-index counter). Failures are per record: they are
//! counted and the scan moves on.

pub mod schedule;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dates::{TargetZone, parse_due_date};
use crate::error::UnitError;
use crate::notify::Mailer;
use crate::notify::template::render_reminder;
use crate::store::record::columns;
use crate::store::{Fields, Record, RecordStore, ReminderStatus};

pub use schedule::{DueIndex, ScheduleScan, next_due_index};

/// Counts from one scanner pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub sent: usize,
    pub errors: usize,
    /// Rows that needed nothing this run.
    pub skipped: usize,
}

impl ScanReport {
    /// A pass that could not start: nothing sent, one error.
    pub fn aborted() -> Self {
        Self {
            errors: 1,
            ..Self::default()
        }
    }

    /// `(sent, errors)`.
    pub fn counts(&self) -> (usize, usize) {
        (self.sent, self.errors)
    }
}

enum RowOutcome {
    Sent,
    Skipped,
}

pub struct ReminderScanner<'a> {
    store: &'a dyn RecordStore,
    mailer: &'a dyn Mailer,
    zone: TargetZone,
}

impl<'a> ReminderScanner<'a> {
    pub fn new(store: &'a dyn RecordStore, mailer: &'a dyn Mailer, zone: TargetZone) -> Self {
        Self {
            store,
            mailer,
            zone,
        }
    }

    /// Scan every record once and send whatever is due at `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> ScanReport {
        let records = match self.store.list_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Reminder pass aborted, could not list records: {e}");
                return ScanReport::aborted();
            }
        };
        info!(count = records.len(), now = %self.zone.format(now), "Scanning records");

        let mut report = ScanReport::default();
        for record in &records {
            let outcome = if record.has_date_columns() {
                self.process_schedule(record, now).await
            } else {
                self.process_status(record, now).await
            };
            match outcome {
                Ok(RowOutcome::Sent) => report.sent += 1,
                Ok(RowOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(record = %record.label(), "{e}");
                    report.errors += 1;
                }
            }
        }

        info!(
            sent = report.sent,
            errors = report.errors,
            skipped = report.skipped,
            "Reminder pass complete"
        );
        report
    }

    async fn process_status(
        &self,
        record: &Record,
        now: DateTime<Utc>,
    ) -> Result<RowOutcome, UnitError> {
        if record.status() != ReminderStatus::Pending {
            return Ok(RowOutcome::Skipped);
        }
        let Some(raw_due) = record.due_date() else {
            debug!(record = %record.label(), "No due date, skipping");
            return Ok(RowOutcome::Skipped);
        };

        let due = match parse_due_date(&raw_due) {
            Ok(due) => due,
            Err(e) => {
                self.mark_error(record).await;
                return Err(e.into());
            }
        };
        if !self.zone.is_due(due, now) {
            return Ok(RowOutcome::Skipped);
        }

        let Some(to) = record.email() else {
            self.mark_error(record).await;
            return Err(UnitError::MissingRecipient);
        };

        let email = render_reminder(record, &to, &self.zone.format(due), None);
        if let Err(e) = self.mailer.send(&email).await {
            self.mark_error(record).await;
            return Err(e.into());
        }

        self.write_status(record, ReminderStatus::Sent).await?;
        info!(record = %record.label(), to = %to, "Reminder sent");
        Ok(RowOutcome::Sent)
    }

    async fn process_schedule(
        &self,
        record: &Record,
        now: DateTime<Utc>,
    ) -> Result<RowOutcome, UnitError> {
        let scan = next_due_index(record, self.zone, now);
        for (index, e) in &scan.invalid {
            warn!(record = %record.label(), index, "Ignoring unparseable date: {e}");
        }
        let Some(DueIndex { index, due }) = scan.selected else {
            return Ok(RowOutcome::Skipped);
        };

        let to = record.email().ok_or(UnitError::MissingRecipient)?;
        let due_display = self.zone.date_of(due).format("%Y-%m-%d").to_string();
        let email = render_reminder(record, &to, &due_display, Some(index));
        // Counter stays put on failure so the next run retries this index.
        self.mailer.send(&email).await?;

        let mut update = Fields::new();
        update.insert(
            record.fields.column_name(columns::SENT_INDEX),
            Value::from(index as u64),
        );
        self.store.update_fields(&record.id, &update).await?;
        info!(record = %record.label(), to = %to, index, "Scheduled reminder sent");
        Ok(RowOutcome::Sent)
    }

    async fn write_status(&self, record: &Record, status: ReminderStatus) -> Result<(), UnitError> {
        let mut update = Fields::new();
        update.insert(record.fields.column_name(columns::STATUS), status.as_str());
        self.store.update_fields(&record.id, &update).await?;
        Ok(())
    }

    /// Best effort: the row already counts as an error either way.
    async fn mark_error(&self, record: &Record) {
        if let Err(e) = self.write_status(record, ReminderStatus::Error).await {
            warn!(record = %record.label(), "Could not mark row as error: {e}");
        }
    }
}
