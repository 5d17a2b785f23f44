//! Timestamp parsing for the formats found across the historical sources.
//!
//! Naive timestamps (no zone) are read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 3] =
  ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y%m%d-%H%M%S"];

/// Parse RFC 3339, ISO 8601 without zone, `YYYY-MM-DD HH:MM:SS`, or the
/// `YYYYMMDD-HHMMSS` form used in label filenames.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  NAIVE_FORMATS
    .iter()
    .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    .map(|naive| naive.and_utc())
}

/// Seconds since the epoch.
pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
  DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap()
  }

  #[test]
  fn accepts_every_historical_format() {
    assert_eq!(parse_timestamp("2024-03-09T10:11:12Z"), Some(utc(10, 11, 12)));
    assert_eq!(
      parse_timestamp("2024-03-09T12:11:12+02:00"),
      Some(utc(10, 11, 12))
    );
    assert_eq!(parse_timestamp("2024-03-09 10:11:12"), Some(utc(10, 11, 12)));
    assert_eq!(parse_timestamp("20240309-101112"), Some(utc(10, 11, 12)));
    assert_eq!(
      parse_timestamp("2024-03-09T10:11:12.250000"),
      Some(utc(10, 11, 12) + chrono::TimeDelta::milliseconds(250))
    );
  }

  #[test]
  fn rejects_garbage() {
    assert_eq!(parse_timestamp(""), None);
    assert_eq!(parse_timestamp("yesterday"), None);
    assert_eq!(parse_timestamp("2024-13-40 10:00:00"), None);
  }

  #[test]
  fn unix_seconds() {
    assert_eq!(from_unix(1_709_979_072), Some(utc(10, 11, 12)));
  }
}
