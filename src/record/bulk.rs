//! Helpers over record collections.

use crate::query::SortDirection;
use crate::record::{Record, RecordType};
use crate::value::{SetMap, Value};
use crate::Result;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Converts records to plain data maps via
/// [`data_map`](Record::data_map).
#[must_use]
pub fn records_to_rows<T: RecordType>(
    records: &[Record<T>],
    hide_internals: bool,
    fields: &[&str],
) -> Vec<SetMap> {
    records
        .iter()
        .map(|record| record.data_map(hide_internals, fields))
        .collect()
}

/// Sorts records by a caller-supplied accessor.
///
/// Keys compare case-normalized as text. The sort is stable, so records
/// with equal keys keep their relative order.
#[must_use]
pub fn sort_records<T, F>(
    mut records: Vec<Record<T>>,
    accessor: F,
    direction: SortDirection,
) -> Vec<Record<T>>
where
    T: RecordType,
    F: Fn(&Record<T>) -> Value,
{
    records.sort_by(|a, b| {
        let key_a = accessor(a).to_text().to_lowercase();
        let key_b = accessor(b).to_text().to_lowercase();
        let ordering = key_a.cmp(&key_b);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    records
}

/// Sorts records by a field's case-normalized value.
#[must_use]
pub fn sort_records_by_field<T: RecordType>(
    records: Vec<Record<T>>,
    field: &str,
    direction: SortDirection,
) -> Vec<Record<T>> {
    sort_records(
        records,
        |record| record.get(field).unwrap_or(Value::Null),
        direction,
    )
}

/// Extracts every record's primary-key value.
///
/// # Errors
///
/// Returns [`Error::Schema`](crate::Error::Schema) when the schema
/// declares no id field.
pub fn record_ids<T: RecordType>(records: &[Record<T>]) -> Result<Vec<Value>> {
    records.iter().map(Record::id).collect()
}

/// Extracts one field's value from every record (`Value::Null` when
/// unset).
#[must_use]
pub fn field_values<T: RecordType>(records: &[Record<T>], field: &str) -> Vec<Value> {
    records
        .iter()
        .map(|record| record.get(field).unwrap_or(Value::Null))
        .collect()
}

/// Indexes records by a field's text-rendered value.
///
/// On duplicate keys the first occurrence wins; later duplicates are
/// dropped with a warning.
#[must_use]
pub fn index_by_field<T: RecordType>(
    records: Vec<Record<T>>,
    field: &str,
) -> BTreeMap<String, Record<T>> {
    let mut index = BTreeMap::new();
    for record in records {
        let key = record.get(field).unwrap_or(Value::Null).to_text();
        match index.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(record);
            },
            Entry::Occupied(entry) => {
                tracing::warn!(
                    record = T::NAME,
                    field,
                    key = %entry.key(),
                    "duplicate key while indexing records, keeping the first"
                );
            },
        }
    }
    index
}
