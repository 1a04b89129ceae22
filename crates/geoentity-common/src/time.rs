//! Publish-date handling.
//!
//! Source publish dates arrive as `yyyymmdd` strings and are persisted as
//! epoch seconds (UTC midnight) so the natural-key comparison stays exact.

use chrono::NaiveDate;

use crate::error::{GeoError, GeoResult};

/// Parse a `yyyymmdd` publish date into epoch seconds at UTC midnight.
pub fn parse_publish_date(yyyymmdd: &str) -> GeoResult<i64> {
    let date = NaiveDate::parse_from_str(yyyymmdd, "%Y%m%d")
        .map_err(|e| GeoError::Config(format!("Invalid publish date '{}': {}", yyyymmdd, e)))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| GeoError::Config(format!("Invalid publish date '{}'", yyyymmdd)))?;
    Ok(midnight.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_date() {
        // 2023-02-16T00:00:00Z
        assert_eq!(parse_publish_date("20230216").unwrap(), 1_676_505_600);
    }

    #[test]
    fn epoch_reference() {
        assert_eq!(parse_publish_date("19700101").unwrap(), 0);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_publish_date("2023-02-16").is_err());
        assert!(parse_publish_date("20231340").is_err());
        assert!(parse_publish_date("").is_err());
    }
}
