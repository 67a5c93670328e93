//! In-memory fakes for the store, mailer and mailbox seams.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{MailboxError, SendError, StoreError};
use crate::mailbox::{FetchedMessage, MailQuery, Mailbox};
use crate::notify::{Mailer, OutgoingEmail};
use crate::store::record::columns;
use crate::store::{Fields, Record, RecordStore};

/// Record store backed by a `Vec`. Ids are `rec1`, `rec2`, ….
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Record>>,
    created: Mutex<Vec<Fields>>,
    fail_listing: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryStore {
    pub fn with_records(rows: Vec<Value>) -> Self {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let Value::Object(map) = row else {
                    panic!("record rows must be JSON objects");
                };
                Record::new(format!("rec{}", i + 1), Fields::from_json(map))
            })
            .collect();
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Field sets passed to `create_record`, in order.
    pub fn created(&self) -> Vec<Fields> {
        self.created.lock().unwrap().clone()
    }

    pub fn status_of(&self, id: &str) -> Option<String> {
        self.find(id)?.fields.text(columns::STATUS)
    }

    pub fn field_of(&self, id: &str, column: &str) -> Option<Value> {
        self.find(id)?.fields.get(&[column]).cloned()
    }

    fn find(&self, id: &str) -> Option<Record> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_records(&self) -> Result<Vec<Record>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn update_fields(&self, id: &str, fields: &Fields) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 422,
                body: "INVALID_VALUE_FOR_COLUMN".into(),
            });
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Api {
                status: 404,
                body: format!("no record {id}"),
            })?;
        for (key, value) in fields.to_json() {
            record.fields.insert(key, value);
        }
        Ok(())
    }

    async fn create_record(&self, fields: &Fields) -> Result<Record, StoreError> {
        let mut records = self.records.lock().unwrap();
        let record = Record::new(format!("rec{}", records.len() + 1), fields.clone());
        records.push(record.clone());
        self.created.lock().unwrap().push(fields.clone());
        Ok(record)
    }
}

/// Mailer that records every email. Recipients in `failing` are rejected.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: HashSet<String>,
}

impl RecordingMailer {
    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            failing: recipients.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Successfully delivered emails.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        if self.failing.contains(&email.to) {
            return Err(SendError::Transport(format!(
                "550 5.1.1 <{}>: mailbox unavailable",
                email.to
            )));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Mailbox that returns a fixed list of messages and records its queries.
pub struct CannedMailbox {
    messages: Vec<FetchedMessage>,
    queries: Mutex<Vec<MailQuery>>,
}

impl CannedMailbox {
    pub fn new(messages: Vec<FetchedMessage>) -> Self {
        Self {
            messages,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<MailQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailbox for CannedMailbox {
    async fn fetch_recent(&self, query: &MailQuery) -> Result<Vec<FetchedMessage>, MailboxError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.messages.clone())
    }
}

/// Mailbox whose every fetch fails with the error `F` builds.
pub struct FailingMailbox<F>(pub F);

#[async_trait]
impl<F> Mailbox for FailingMailbox<F>
where
    F: Fn() -> MailboxError + Send + Sync,
{
    async fn fetch_recent(&self, _query: &MailQuery) -> Result<Vec<FetchedMessage>, MailboxError> {
        Err((self.0)())
    }
}

/// A plain-text RFC 822 message.
pub fn raw_mail(uid: &str, subject: &str, date: &str, body: &str) -> FetchedMessage {
    let raw = format!(
        "From: registrar@example.com\n\
         To: investor@example.com\n\
         Subject: {subject}\n\
         Date: {date}\n\
         Content-Type: text/plain; charset=utf-8\n\
         \n\
         {body}"
    );
    FetchedMessage {
        uid: uid.to_string(),
        raw: raw.replace('\n', "\r\n").into_bytes(),
    }
}
