pub mod format;
pub mod resolve;

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TimestampError;

pub use format::format_timestamp;
pub use resolve::{resolve_fallback, source_value, ResolveOptions};

/// Textual convention of exif date fields.
pub const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

static OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<sign>[+-])(?P<hours>\d{2}):(?P<minutes>\d{2})$").unwrap());

/// Signed `HH:MM` offset that output timestamps are normalized through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimezoneOffset(FixedOffset);

impl TimezoneOffset {
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        let invalid = || TimestampError::Offset(s.to_string());
        let caps = OFFSET_RE.captures(s.trim()).ok_or_else(invalid)?;
        let hours: i32 = caps["hours"].parse().map_err(|_| invalid())?;
        let minutes: i32 = caps["minutes"].parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }
        let mut seconds = hours * 3600 + minutes * 60;
        if &caps["sign"] == "-" {
            seconds = -seconds;
        }
        FixedOffset::east_opt(seconds).map(Self).ok_or_else(invalid)
    }

    pub fn fixed(&self) -> FixedOffset {
        self.0
    }
}

impl fmt::Display for TimezoneOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.local_minus_utc();
        let sign = if total < 0 { '-' } else { '+' };
        let total = total.abs();
        write!(f, "{}{:02}:{:02}", sign, total / 3600, (total % 3600) / 60)
    }
}

impl TryFrom<String> for TimezoneOffset {
    type Error = TimestampError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TimezoneOffset> for String {
    fn from(offset: TimezoneOffset) -> Self {
        offset.to_string()
    }
}

/// Strict parse of a `yyyy:MM:dd HH:mm:ss` value.
pub fn parse_exif_datetime(raw: &str) -> Result<NaiveDateTime, TimestampError> {
    NaiveDateTime::parse_from_str(raw, EXIF_FORMAT)
        .map_err(|_| TimestampError::Parse(raw.to_string()))
}

/// Absolute instant of a raw value, read as wall-clock time in `offset`
/// (or the local timezone when none is given).
pub fn instant_of(
    raw: &str,
    offset: Option<&TimezoneOffset>,
) -> Result<DateTime<Utc>, TimestampError> {
    let naive = parse_exif_datetime(raw)?;
    let instant = match offset {
        Some(tz) => tz
            .fixed()
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
        None => naive
            .and_local_timezone(chrono::Local)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
    };
    instant.ok_or_else(|| TimestampError::Parse(raw.to_string()))
}

/// exiftool renders unset QuickTime dates as all zeros.
pub fn is_zero_date(raw: &str) -> bool {
    raw.contains('0') && raw.chars().all(|c| matches!(c, '0' | ':' | ' ' | '-' | '.' | '+'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_parse() {
        let minus = TimezoneOffset::parse("-05:00").unwrap();
        assert_eq!(minus.fixed().local_minus_utc(), -5 * 3600);
        let plus = TimezoneOffset::parse("+09:30").unwrap();
        assert_eq!(plus.fixed().local_minus_utc(), 9 * 3600 + 1800);
        assert_eq!(TimezoneOffset::parse("+00:00").unwrap().to_string(), "+00:00");
        assert_eq!(TimezoneOffset::parse("-05:00").unwrap().to_string(), "-05:00");
        assert!(TimezoneOffset::parse("05:00").is_err());
        assert!(TimezoneOffset::parse("+5:00").is_err());
        assert!(TimezoneOffset::parse("+24:00").is_err());
        assert!(TimezoneOffset::parse("+01:60").is_err());
    }

    #[test]
    fn test_zero_dates() {
        assert!(is_zero_date("0000:00:00 00:00:00"));
        assert!(!is_zero_date("2021:05:01 10:00:00"));
        assert!(!is_zero_date(""));
    }

    #[test]
    fn test_instant_with_offset() {
        let tz = TimezoneOffset::parse("+02:00").unwrap();
        let instant = instant_of("2021:05:01 10:00:00", Some(&tz)).unwrap();
        assert_eq!(instant.format(EXIF_FORMAT).to_string(), "2021:05:01 08:00:00");
        assert!(instant_of("yesterday", Some(&tz)).is_err());
    }
}
