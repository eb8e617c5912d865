//! Calendar breakdown of play timestamps.
//!
//! Timestamps are epoch milliseconds interpreted in UTC. `week` is the
//! ISO-8601 week number, `year` the calendar year (not the ISO week-year),
//! and `weekday` counts from Monday = 0 to Sunday = 6.

use super::error::EtlError;
use crate::warehouse::TimeRow;
use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalendarFields {
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    pub weekday: u32,
}

pub fn derive_calendar_fields(ts_millis: i64) -> Result<CalendarFields, EtlError> {
    let at: DateTime<Utc> = DateTime::from_timestamp_millis(ts_millis)
        .ok_or(EtlError::InvalidTimestamp(ts_millis))?;
    Ok(CalendarFields {
        hour: at.hour(),
        day: at.day(),
        week: at.iso_week().week(),
        month: at.month(),
        year: at.year(),
        weekday: at.weekday().num_days_from_monday(),
    })
}

pub fn time_row(ts_millis: i64) -> Result<TimeRow, EtlError> {
    let fields = derive_calendar_fields(ts_millis)?;
    Ok(TimeRow {
        start_time: ts_millis,
        hour: fields.hour,
        day: fields.day,
        week: fields.week,
        month: fields.month,
        year: fields.year,
        weekday: fields.weekday,
    })
}
