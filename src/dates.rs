//! Due-date parsing and the fixed target timezone.
//!
//! Record stores hand back dates in whatever shape the person typing them
//! preferred. Everything is parsed to UTC first; values without an offset
//! are taken to be UTC. Comparisons and display then happen in a single
//! fixed offset (`TargetZone`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

use crate::error::DateParseError;

/// Naive datetime layouts, tried in order after RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts. Midnight UTC is assumed.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%b-%y",
    "%d-%b-%Y",
    "%d/%m/%Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// Parse a due-date string from the record store.
pub fn parse_due_date(raw: &str) -> Result<DateTime<Utc>, DateParseError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DateParseError::Empty);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(naive.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt)
            && let Some(naive) = date.and_hms_opt(0, 0, 0)
        {
            return Ok(naive.and_utc());
        }
    }

    Err(DateParseError::Unrecognised(value.to_string()))
}

/// The fixed offset all comparisons are normalised to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetZone(FixedOffset);

impl TargetZone {
    /// India Standard Time, UTC+05:30.
    pub fn ist() -> Self {
        Self(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| Utc.fix()))
    }

    pub fn offset(&self) -> FixedOffset {
        self.0
    }

    /// Convert a UTC instant into the target zone.
    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.0)
    }

    /// Calendar date of `instant` in the target zone.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.localize(instant).date_naive()
    }

    /// Whether `due` has been reached at `now`.
    pub fn is_due(&self, due: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.localize(now) >= self.localize(due)
    }

    /// Whether the calendar date of `due` is on or before today.
    pub fn is_due_by_date(&self, due: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.date_of(due) <= self.date_of(now)
    }

    /// Human-readable timestamp, e.g. `2024-09-28 10:00 +05:30`.
    pub fn format(&self, instant: DateTime<Utc>) -> String {
        self.localize(instant).format("%Y-%m-%d %H:%M %:z").to_string()
    }
}

impl Default for TargetZone {
    fn default() -> Self {
        Self::ist()
    }
}

impl fmt::Display for TargetZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UTC{}", self.0)
    }
}

impl FromStr for TargetZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return Ok(Self(Utc.fix()));
        }
        trimmed
            .parse::<FixedOffset>()
            .map(Self)
            .map_err(|e| format!("expected an offset like +05:30: {e}"))
    }
}
