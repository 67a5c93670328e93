//! Airtable REST backend for `RecordStore`.
//!
//! Uses the plain `/v0/{base}/{table}` endpoints with a personal access
//! token. Listing follows the `offset` cursor until the table is exhausted.

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::StoreError;
use crate::store::record::{Fields, Record};
use crate::store::traits::RecordStore;

/// Default Airtable API root.
pub const DEFAULT_API_URL: &str = "https://api.airtable.com";

/// Page size requested from the list endpoint (Airtable's maximum).
const PAGE_SIZE: &str = "100";

/// Connection settings for one Airtable table.
#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_url: String,
    pub base_id: String,
    pub table_name: String,
    pub token: SecretString,
}

#[derive(Debug, Deserialize)]
struct AirtableRecord {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl From<AirtableRecord> for Record {
    fn from(raw: AirtableRecord) -> Self {
        Record::new(raw.id, Fields::from_json(raw.fields))
    }
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<AirtableRecord>,
    offset: Option<String>,
}

/// Airtable-backed record store.
pub struct AirtableStore {
    config: AirtableConfig,
    client: reqwest::Client,
}

impl AirtableStore {
    pub fn new(config: AirtableConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// `{api}/v0/{base}/{table}` plus any extra path segments, each escaped.
    fn table_url(&self, extra: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| StoreError::Url(format!("{}: {e}", self.config.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::Url(format!("{} cannot be a base", self.config.api_url)))?
            .pop_if_empty()
            .extend(["v0", self.config.base_id.as_str(), self.config.table_name.as_str()])
            .extend(extra);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn list_records(&self) -> Result<Vec<Record>, StoreError> {
        let url = self.table_url(&[])?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(url.clone())
                .bearer_auth(self.config.token.expose_secret())
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(cursor) = &offset {
                request = request.query(&[("offset", cursor.as_str())]);
            }

            let page: ListPage = Self::decode(request.send().await?).await?;
            debug!(count = page.records.len(), "Fetched record page");
            records.extend(page.records.into_iter().map(Record::from));

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    async fn update_fields(&self, id: &str, fields: &Fields) -> Result<(), StoreError> {
        let url = self.table_url(&[id])?;
        let body = serde_json::json!({ "fields": fields.to_json() });
        let resp = self
            .client
            .patch(url)
            .bearer_auth(self.config.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let _: AirtableRecord = Self::decode(resp).await?;
        Ok(())
    }

    async fn create_record(&self, fields: &Fields) -> Result<Record, StoreError> {
        let url = self.table_url(&[])?;
        let body = serde_json::json!({ "fields": fields.to_json(), "typecast": true });
        let resp = self
            .client
            .post(url)
            .bearer_auth(self.config.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let created: AirtableRecord = Self::decode(resp).await?;
        Ok(created.into())
    }
}
