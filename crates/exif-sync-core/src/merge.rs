use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::TimestampError;
use crate::record::{AttributeSet, MetadataRecord};
use crate::timestamp::{
    format_timestamp, resolve_fallback, source_value, ResolveOptions, TimezoneOffset,
};

/// Where a field's new value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Same field on the source record.
    Source(String),
    /// Fallback timestamp of the source record.
    Fallback(String),
    /// Neither present; the field is left unset.
    Absent,
}

impl FieldValue {
    pub fn raw(&self) -> Option<&str> {
        match self {
            FieldValue::Source(v) | FieldValue::Fallback(v) => Some(v),
            FieldValue::Absent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPlan {
    pub field: String,
    pub before: Option<String>,
    pub value: FieldValue,
    /// Formatted value to write, `None` when absent or unformattable.
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TimestampError>,
}

impl FieldPlan {
    pub fn is_change(&self) -> bool {
        matches!(&self.after, Some(after) if self.before.as_deref() != Some(after.as_str()))
    }
}

/// Merged view of one target record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePlan {
    pub fallback: Option<String>,
    pub fields: Vec<FieldPlan>,
}

impl MergePlan {
    /// Fields whose write would alter the target.
    pub fn changes(&self) -> impl Iterator<Item = &FieldPlan> {
        self.fields.iter().filter(|f| f.is_change())
    }

    pub fn has_changes(&self) -> bool {
        self.changes().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &TimestampError)> {
        self.fields
            .iter()
            .filter_map(|f| f.error.as_ref().map(|e| (f.field.as_str(), e)))
    }

    /// Field/value pairs to hand to the transport.
    pub fn write_set(&self) -> MetadataRecord {
        self.changes()
            .filter_map(|f| f.after.as_ref().map(|v| (f.field.clone(), v.clone())))
            .collect()
    }

    /// Target record as it will read after the write.
    pub fn apply(&self, target: &MetadataRecord) -> MetadataRecord {
        let mut after = target.clone();
        for f in self.changes() {
            if let Some(v) = &f.after {
                after.insert(f.field.clone(), v.clone());
            }
        }
        after
    }
}

/// Compute the merged attribute values for a target from its source record.
///
/// Only attribute fields the target already reports are planned. Container
/// formats that cannot hold a field never report it, so adding it would be
/// dropped by the writer and the pair would never converge.
pub fn plan_merge(
    source: &MetadataRecord,
    target: &MetadataRecord,
    attributes: &AttributeSet,
    offset: Option<&TimezoneOffset>,
    resolve: &ResolveOptions,
) -> MergePlan {
    let fallback = resolve_fallback(source, attributes, resolve);

    let fields = attributes
        .iter()
        .filter(|field| target.contains(field))
        .map(|field| {
            let value = match (source_value(source, field, resolve), &fallback) {
                (Some(v), _) => FieldValue::Source(v.to_string()),
                (None, Some(fb)) => FieldValue::Fallback(fb.clone()),
                (None, None) => FieldValue::Absent,
            };
            let (after, error) = match value.raw().map(|raw| format_timestamp(raw, offset)) {
                Some(Ok(formatted)) => (Some(formatted), None),
                Some(Err(e)) => (None, Some(e)),
                None => (None, None),
            };
            FieldPlan {
                field: field.to_string(),
                before: target.get(field).map(str::to_string),
                value,
                after,
                error,
            }
        })
        .collect();

    MergePlan { fallback, fields }
}

/// One row of the full before/after comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub field: String,
    pub source: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Every field present on the source or target, with each side's value.
pub fn full_diff(
    source: &MetadataRecord,
    target: &MetadataRecord,
    plan: &MergePlan,
) -> Vec<FieldDiff> {
    let after = plan.apply(target);
    let names: BTreeSet<&str> = source.field_names().chain(target.field_names()).collect();
    names
        .into_iter()
        .map(|name| FieldDiff {
            field: name.to_string(),
            source: source.get(name).map(str::to_string),
            before: target.get(name).map(str::to_string),
            after: after.get(name).map(str::to_string),
        })
        .collect()
}
