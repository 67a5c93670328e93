//! Numbered due-date columns (`Date 1` … `Date 72`).
//!
//! A record in schedule mode carries a counter of the last index a reminder
//! went out for. Each run picks the lowest later index whose date has come.

use chrono::{DateTime, Utc};

use crate::dates::{TargetZone, parse_due_date};
use crate::error::DateParseError;
use crate::store::record::{MAX_DATE_COLUMNS, Record};

/// The numbered date a reminder should be sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueIndex {
    pub index: usize,
    pub due: DateTime<Utc>,
}

/// Outcome of scanning one record's numbered dates.
#[derive(Debug, Default, PartialEq)]
pub struct ScheduleScan {
    pub selected: Option<DueIndex>,
    /// Unparseable dates passed over before the selection.
    pub invalid: Vec<(usize, DateParseError)>,
}

/// Lowest index above the record's counter whose date is on or before
/// today in `zone`.
pub fn next_due_index(record: &Record, zone: TargetZone, now: DateTime<Utc>) -> ScheduleScan {
    let mut scan = ScheduleScan::default();
    for index in record.sent_index().saturating_add(1)..=MAX_DATE_COLUMNS {
        let Some(raw) = record.date_at(index) else {
            continue;
        };
        match parse_due_date(&raw) {
            Ok(due) if zone.is_due_by_date(due, now) => {
                scan.selected = Some(DueIndex { index, due });
                break;
            }
            Ok(_) => {}
            Err(e) => scan.invalid.push((index, e)),
        }
    }
    scan
}
