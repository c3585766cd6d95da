use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::{catalog::AppCategory, session::SessionState};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} value {value} is out of range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_state(value: &str) -> Result<SessionState> {
    SessionState::parse(value)
}

pub fn parse_category(value: &str) -> Result<AppCategory> {
    AppCategory::parse(value).ok_or_else(|| anyhow!("unknown app category {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversions_reject_out_of_range() {
        assert!(to_i64(u64::MAX).is_err());
        assert_eq!(to_i64(42).unwrap(), 42);
        assert!(to_u64(-1, "remaining_secs").is_err());
        assert!(to_u32(i64::from(u32::MAX) + 1, "attempt_count").is_err());
    }

    #[test]
    fn datetimes_parse_rfc3339() {
        let now = Utc::now();
        let parsed = parse_datetime(&now.to_rfc3339(), "updated_at").unwrap();
        assert_eq!(parsed, now);
        assert!(parse_datetime("yesterday", "updated_at").is_err());
        assert_eq!(parse_optional_datetime(None, "started_at").unwrap(), None);
    }
}
