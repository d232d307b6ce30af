use serde::{Deserialize, Serialize};

use super::is_zero_date;
use crate::record::{AttributeSet, MetadataRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Treat `0000:00:00 00:00:00` style values as absent.
    pub skip_zero_dates: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { skip_zero_dates: true }
    }
}

/// Value of `field` on the source record, if it counts as present.
pub fn source_value<'a>(
    record: &'a MetadataRecord,
    field: &str,
    options: &ResolveOptions,
) -> Option<&'a str> {
    record
        .get(field)
        .filter(|v| !(options.skip_zero_dates && is_zero_date(v)))
}

/// Smallest attribute value on the record, compared as raw strings.
///
/// For values in `yyyy:MM:dd HH:mm:ss` sharing one timezone this is the
/// earliest date. Returns `None` when no attribute field is present.
pub fn resolve_fallback(
    record: &MetadataRecord,
    attributes: &AttributeSet,
    options: &ResolveOptions,
) -> Option<String> {
    attributes
        .iter()
        .filter_map(|field| source_value(record, field, options))
        .min()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smallest_value_wins() {
        let record: MetadataRecord = [
            ("CreateDate", "2021:05:01 10:00:00"),
            ("ModifyDate", "2021:05:02 09:00:00"),
            ("Title", "0000 comes first but is not an attribute"),
        ]
        .into_iter()
        .collect();
        let fallback =
            resolve_fallback(&record, &AttributeSet::default(), &ResolveOptions::default());
        assert_eq!(fallback.as_deref(), Some("2021:05:01 10:00:00"));
    }

    #[test]
    fn test_absent_when_no_attribute_present() {
        let record: MetadataRecord = [("Title", "x")].into_iter().collect();
        let fallback =
            resolve_fallback(&record, &AttributeSet::default(), &ResolveOptions::default());
        assert_eq!(fallback, None);
    }

    #[test]
    fn test_fallback_is_one_of_the_values() {
        let record: MetadataRecord = [
            ("TrackCreateDate", "2019:01:01 00:00:01"),
            ("MediaModifyDate", "2020:01:01 00:00:00"),
            ("EncodingTime", "2018:12:31 23:59:59"),
        ]
        .into_iter()
        .collect();
        let attrs = AttributeSet::default();
        let fallback = resolve_fallback(&record, &attrs, &ResolveOptions::default()).unwrap();
        assert!(attrs.iter().any(|f| record.get(f) == Some(fallback.as_str())));
        assert_eq!(fallback, "2018:12:31 23:59:59");
    }

    #[test]
    fn test_zero_dates_are_skipped_unless_kept() {
        let record: MetadataRecord = [
            ("MediaCreateDate", "0000:00:00 00:00:00"),
            ("CreateDate", "2021:05:01 10:00:00"),
        ]
        .into_iter()
        .collect();
        let attrs = AttributeSet::default();
        assert_eq!(
            resolve_fallback(&record, &attrs, &ResolveOptions::default()).as_deref(),
            Some("2021:05:01 10:00:00")
        );
        let keep = ResolveOptions { skip_zero_dates: false };
        let kept = resolve_fallback(&record, &attrs, &keep);
        assert_eq!(kept.as_deref(), Some("0000:00:00 00:00:00"));
        let skip = ResolveOptions::default();
        assert_eq!(source_value(&record, "MediaCreateDate", &skip), None);
    }

    #[test]
    fn test_custom_attribute_set() {
        let record: MetadataRecord = [("A", "2"), ("B", "1"), ("C", "0")].into_iter().collect();
        let attrs = AttributeSet::new(["A", "B"]);
        let keep = ResolveOptions { skip_zero_dates: false };
        assert_eq!(resolve_fallback(&record, &attrs, &keep).as_deref(), Some("1"));
    }
}
