//! Utility functions for SQLite storage operations.
//!
//! Amounts, instants and dates are stored as TEXT. Instants are always
//! written in one fixed RFC 3339 shape (UTC, millisecond precision, `Z`
//! suffix) so that string comparison in SQL orders them chronologically.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;

use chainforge_core::errors::{Result, ValidationError};

/// Maximum number of parameters for SQLite IN (...) queries.
///
/// SQLite limits the number of bound parameters per statement (typically 999),
/// so lists passed to `eq_any` are split into chunks of this size.
pub const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

/// Chunk a slice into smaller slices for batch SQLite queries.
pub fn chunk_for_sqlite<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(SQLITE_MAX_PARAMS_CHUNK)
}

pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(ValidationError::from)?
        .with_timezone(&Utc))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(ValidationError::from)?)
}

pub fn parse_decimal(value: &str) -> Result<Decimal> {
    Ok(Decimal::from_str(value).map_err(ValidationError::from)?)
}
