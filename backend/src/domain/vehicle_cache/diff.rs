//! Field-wise diffing of cached projections.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::domain::{FieldChange, UpdateKind, UpdateLogDraft, VehicleId};

/// Bookkeeping fields that change on every write and are never diffed.
const VOLATILE_FIELDS: [&str; 2] = ["created_at", "updated_at"];

/// JSON snapshot of `value` without the bookkeeping timestamps.
pub(crate) fn snapshot<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    let mut snapshot = serde_json::to_value(value)?;
    if let Value::Object(fields) = &mut snapshot {
        for field in VOLATILE_FIELDS {
            fields.remove(field);
        }
    }
    Ok(snapshot)
}

/// Fields present in both snapshots whose values differ.
pub(crate) fn field_changes(old: &Value, new: &Value) -> BTreeMap<String, FieldChange> {
    let (Value::Object(old), Value::Object(new)) = (old, new) else {
        return BTreeMap::new();
    };
    old.iter()
        .filter_map(|(field, before)| {
            let after = new.get(field)?;
            (before != after).then(|| {
                (
                    field.clone(),
                    FieldChange {
                        old: before.clone(),
                        new: after.clone(),
                    },
                )
            })
        })
        .collect()
}

/// Inputs for one change-log entry.
pub(crate) struct DiffInput<'a> {
    pub vehicle_id: VehicleId,
    pub update_type: UpdateKind,
    pub previous: Option<Value>,
    pub current: Value,
    pub actor: Option<&'a str>,
    pub at: DateTime<Utc>,
}

/// Build the log entry describing a write.
pub(crate) fn build_entry(input: DiffInput<'_>) -> UpdateLogDraft {
    let changes = input
        .previous
        .as_ref()
        .map(|previous| field_changes(previous, &input.current))
        .unwrap_or_default();
    UpdateLogDraft {
        vehicle_id: input.vehicle_id,
        update_type: input.update_type,
        old_value: input.previous,
        new_value: input.current,
        changes,
        actor: input.actor.map(str::to_owned),
        created_at: input.at,
    }
}
