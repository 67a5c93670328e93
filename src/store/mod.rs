//! Record store layer: the `RecordStore` trait and its Airtable backend.

pub mod airtable;
pub mod record;
pub mod traits;

pub use airtable::{AirtableConfig, AirtableStore};
pub use record::{Fields, Record, ReminderStatus};
pub use traits::RecordStore;
