//! Due reminders: a batch job that emails payment reminders from an
//! Airtable table and imports new identifiers from allotment mail.

pub mod config;
pub mod dates;
pub mod error;
pub mod importer;
pub mod job;
pub mod logging;
pub mod mailbox;
pub mod notify;
pub mod reminders;
pub mod store;

#[cfg(test)]
mod testing;
