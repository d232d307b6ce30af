use super::{instant_of, TimezoneOffset, EXIF_FORMAT};
use crate::error::TimestampError;

/// Produce the value written into a target field.
///
/// Without an offset the raw value passes through untouched. With one, the
/// raw value is read as wall-clock time in that offset and re-rendered as the
/// UTC wall-clock reading, in the same exif convention.
pub fn format_timestamp(
    raw: &str,
    offset: Option<&TimezoneOffset>,
) -> Result<String, TimestampError> {
    match offset {
        None => Ok(raw.to_string()),
        Some(tz) => {
            let instant = instant_of(raw, Some(tz))?;
            Ok(instant.format(EXIF_FORMAT).to_string())
        }
    }
}
