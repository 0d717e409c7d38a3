//! Timestamps as the crawl service writes them.
//!
//! Rows stamped on the server side carry no offset
//! (`2024-05-01T10:00:00.123456`); those are read as UTC. Offset-carrying
//! RFC 3339 values are accepted as well.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(stamp) => Ok(stamp.with_timezone(&Utc)),
        Err(rfc_err) => NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
            .ok_or(rfc_err),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(|e| de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
}

/// Same as [`deserialize`] for optional fields; `null` reads as `None`
pub mod option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => super::parse(&raw)
                .map(Some)
                .map_err(|e| de::Error::custom(format!("invalid timestamp '{}': {}", raw, e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_offsetless_stamp_is_utc() {
        let stamp = parse("2024-05-01T10:00:00.123456").unwrap();
        assert_eq!(stamp.with_nanosecond(0).unwrap(), Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!(stamp.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_offset_is_honoured() {
        let stamp = parse("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(stamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!(parse("2024-05-01 10:00:00").unwrap(), stamp);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse("yesterday").is_err());
    }
}
