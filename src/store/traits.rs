//! `RecordStore` trait: the single async interface both passes use.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::record::{Fields, Record};

/// Backend-agnostic access to the tabular record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch every row in the table.
    async fn list_records(&self) -> Result<Vec<Record>, StoreError>;

    /// Overwrite the given fields on an existing row. Other fields are untouched.
    async fn update_fields(&self, id: &str, fields: &Fields) -> Result<(), StoreError>;

    /// Append a new row and return it as stored.
    async fn create_record(&self, fields: &Fields) -> Result<Record, StoreError>;
}
