//! Record type with normalised field keys.
//!
//! Column names in the store drift between tables ("Due Date", "due_date",
//! "DueDate"). At the store boundary every key is normalised to lowercase
//! alphanumerics so lookups are stable, while the original spelling is kept
//! for write-back.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Maximum number of numbered due-date columns (`Date 1` .. `Date 72`).
pub const MAX_DATE_COLUMNS: usize = 72;

/// Canonical column names and the aliases accepted for them.
pub mod columns {
    pub const DUE_DATE: &[&str] = &["Due Date", "ReminderTime", "Reminder Date", "Date"];
    pub const EMAIL: &[&str] = &["Email", "Email Address", "Recipient"];
    pub const CODE: &[&str] = &["ISIN", "ISIN Code", "Code"];
    pub const ISSUER: &[&str] = &["Company", "Company Name", "Issuer"];
    pub const AMOUNT: &[&str] = &["Amount", "Amount Due"];
    pub const STATUS: &[&str] = &["Status"];
    pub const SENT_INDEX: &[&str] = &["Last Sent Index", "Reminders Sent Upto"];
    pub const SUBJECT: &[&str] = &["Subject"];
    pub const MESSAGE: &[&str] = &["Message"];
    pub const REMINDER_ID: &[&str] = &["ReminderID"];

    /// Columns written by the identifier importer.
    pub const IMPORT_CODE: &str = "ISIN";
    pub const IMPORT_ISSUER: &str = "Company Name";
    pub const IMPORT_INSTRUMENT: &str = "Security Type";
    pub const IMPORT_ALLOTMENT_DATE: &str = "Allotment Date";
}

/// Lowercase and drop everything that is not a letter or digit.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Name of the `index`-th numbered date column.
pub fn date_column(index: usize) -> String {
    format!("Date {index}")
}

/// Reminder status stored in the `Status` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderStatus {
    Pending,
    Sent,
    Error,
    Other(String),
}

impl ReminderStatus {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("pending") {
            Self::Pending
        } else if trimmed.eq_ignore_ascii_case("sent") {
            Self::Sent
        } else if trimmed.eq_ignore_ascii_case("error") {
            Self::Error
        } else {
            Self::Other(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Sent => "Sent",
            Self::Error => "Error",
            Self::Other(s) => s,
        }
    }
}

/// Field map keyed by normalised column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: BTreeMap<String, (String, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the raw JSON object the store returns.
    pub fn from_json(map: Map<String, Value>) -> Self {
        let mut fields = Self::new();
        for (key, value) in map {
            fields.insert(key, value);
        }
        fields
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.entries.insert(normalize_key(&key), (key, value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw value under the first alias that is present.
    pub fn get(&self, aliases: &[&str]) -> Option<&Value> {
        aliases
            .iter()
            .find_map(|alias| self.entries.get(&normalize_key(alias)))
            .map(|(_, v)| v)
    }

    /// Non-empty text value under the first alias that is present.
    ///
    /// Numbers and booleans are rendered to text; single-element arrays
    /// (linked or lookup fields) are unwrapped.
    pub fn text(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|alias| {
            self.entries
                .get(&normalize_key(alias))
                .and_then(|(_, v)| value_text(v))
        })
    }

    /// Column name as the store spells it, or the first alias if absent.
    pub fn column_name(&self, aliases: &[&str]) -> String {
        aliases
            .iter()
            .find_map(|alias| self.entries.get(&normalize_key(alias)))
            .map(|(original, _)| original.clone())
            .unwrap_or_else(|| aliases.first().copied().unwrap_or_default().to_string())
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.entries
            .values()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) if items.len() == 1 => return value_text(&items[0]),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// A row in the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Row id assigned by the store.
    pub id: String,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn due_date(&self) -> Option<String> {
        self.fields.text(columns::DUE_DATE)
    }

    pub fn email(&self) -> Option<String> {
        self.fields.text(columns::EMAIL)
    }

    pub fn code(&self) -> Option<String> {
        self.fields.text(columns::CODE)
    }

    pub fn issuer(&self) -> Option<String> {
        self.fields.text(columns::ISSUER)
    }

    /// Amount with currency symbols and thousands separators stripped.
    pub fn amount(&self) -> Option<Decimal> {
        let raw = self.fields.text(columns::AMOUNT)?;
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();
        Decimal::from_str(&cleaned).ok()
    }

    pub fn status(&self) -> ReminderStatus {
        self.fields
            .text(columns::STATUS)
            .map(|s| ReminderStatus::parse(&s))
            .unwrap_or(ReminderStatus::Pending)
    }

    /// Index of the last numbered date a reminder was sent for (0 = none).
    /// Values past the last column mean every column has been handled.
    pub fn sent_index(&self) -> usize {
        self.fields
            .text(columns::SENT_INDEX)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|n| *n >= 0.0)
            .map(|n| n.min(MAX_DATE_COLUMNS as f64) as usize)
            .unwrap_or(0)
    }

    /// Raw text of the `index`-th numbered date column.
    pub fn date_at(&self, index: usize) -> Option<String> {
        self.fields.text(&[date_column(index).as_str()])
    }

    /// Whether the row carries any numbered date column.
    pub fn has_date_columns(&self) -> bool {
        (1..=MAX_DATE_COLUMNS).any(|i| self.fields.get(&[date_column(i).as_str()]).is_some())
    }

    /// Label used in logs: the explicit reminder id, the code, or the row id.
    pub fn label(&self) -> String {
        self.fields
            .text(columns::REMINDER_ID)
            .or_else(|| self.code())
            .unwrap_or_else(|| self.id.clone())
    }
}
