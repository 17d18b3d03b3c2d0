//! Set-map validation for inserts and updates.
//!
//! Both validators rebuild the caller's set map in the schema's own field
//! order, applying the extension hooks, typecasting, uniqueness checks,
//! and bookkeeping auto-population. The returned map is what gets
//! persisted and what the `after_*` hooks receive as "executed".

use crate::query::{Filter, QueryOptions};
use crate::record::{Record, RecordType};
use crate::value::{SetMap, Value, ZERO_DATETIME, now_datetime, typecast};
use crate::{Error, Result};

/// Validates an insert set map.
///
/// Order: unknown/protected hooks over the caller's keys, then a
/// schema-order rebuild over the insertable fields (mandatory-empty hook,
/// typecast, single-field uniqueness, defaults for unsupplied fields),
/// then composite unique indexes, then bookkeeping fields.
pub(crate) fn validate_insert<T: RecordType>(store: &crate::store::Store, given: &SetMap) -> Result<SetMap> {
    let schema = T::schema();

    for (field, value) in given.iter() {
        match schema.field(field) {
            None => {
                if !T::on_insert_field_unknown(field, value) {
                    return Err(Error::FieldUnknown {
                        field: field.to_string(),
                    });
                }
            },
            Some(spec) if !spec.insertable => {
                if !T::on_insert_field_protected(field, value) {
                    // A protected field that is not even selectable looks
                    // unknown to the caller.
                    return Err(if spec.selectable {
                        Error::FieldProtected {
                            field: field.to_string(),
                        }
                    } else {
                        Error::FieldUnknown {
                            field: field.to_string(),
                        }
                    });
                }
            },
            Some(_) => {},
        }
    }

    let mut valid = SetMap::new();
    for (name, spec) in schema.fields() {
        if !spec.insertable {
            continue;
        }

        if let Some(raw) = given.get(name) {
            let mut raw = raw.clone();
            if raw.is_empty_text() && spec.mandatory {
                if !T::on_insert_mandatory_missing(name) {
                    return Err(Error::MandatoryMissing {
                        field: name.to_string(),
                    });
                }
                raw = Value::Text(String::new());
            }

            let value = typecast(&raw, spec.field_type);

            if spec.unique {
                let matches = Record::<T>::find(
                    store,
                    &Filter::new().eq(name, value.clone()),
                    None,
                    None,
                    &QueryOptions::new(),
                )?;
                if let Some(existing) = matches.first() {
                    return Err(Error::UniqueFieldDuplicate {
                        fields: name.to_string(),
                        existing_id: existing_id_text(existing),
                    });
                }
            }

            valid.insert(name, value);
        } else if spec.mandatory {
            return Err(Error::MandatoryMissing {
                field: name.to_string(),
            });
        } else {
            valid.insert(name, spec.default.clone());
        }
    }

    for index in schema.unique_indexes() {
        let mut filter = Filter::new();
        for member in index {
            filter = filter.eq(
                *member,
                valid.get(member).cloned().unwrap_or(Value::Null),
            );
        }
        let matches = Record::<T>::find(store, &filter, None, None, &QueryOptions::new())?;
        if let Some(existing) = matches.first() {
            return Err(Error::UniqueFieldDuplicate {
                fields: index.join(" & "),
                existing_id: existing_id_text(existing),
            });
        }
    }

    if schema.has_field("insert_ts") {
        valid.insert("insert_ts", Value::Text(now_datetime()));
    }
    if schema.has_field("update_ts") {
        valid.insert("update_ts", Value::Text(now_datetime()));
    }
    if schema.has_field("deleted") {
        valid.insert("deleted", Value::Int(0));
    }
    if schema.has_field("delete_ts") {
        valid.insert("delete_ts", Value::Text(ZERO_DATETIME.to_string()));
    }

    Ok(valid)
}

/// Validates an update set map.
///
/// Only fields whose typecast value differs from the record's current
/// state survive into the validated map; an unchanged set map validates to
/// empty. Composite unique indexes are only checked when one of their
/// members is actually changing. Setting `deleted = 1` requires delete
/// permission and stamps `delete_ts`; a non-empty result refreshes
/// `update_ts` when declared.
pub(crate) fn validate_update<T: RecordType>(
    store: &crate::store::Store,
    record: &Record<T>,
    given: &SetMap,
) -> Result<SetMap> {
    let schema = T::schema();

    // A soft delete through the update path needs the delete permission.
    if let Some(flag) = given.get("deleted") {
        if flag.as_int() == 1 && !T::is_delete_allowed(record) {
            return Err(Error::DeleteForbidden);
        }
    }

    for (field, value) in given.iter() {
        match schema.field(field) {
            None => {
                if !T::on_update_field_unknown(field, value) {
                    return Err(Error::FieldUnknown {
                        field: field.to_string(),
                    });
                }
            },
            Some(spec) if !spec.updatable => {
                if !T::on_update_field_protected(field, value) {
                    return Err(if spec.selectable {
                        Error::FieldProtected {
                            field: field.to_string(),
                        }
                    } else {
                        Error::FieldUnknown {
                            field: field.to_string(),
                        }
                    });
                }
            },
            Some(_) => {},
        }
    }

    let mut valid = SetMap::new();
    for (name, spec) in schema.fields() {
        let Some(raw) = given.get(name) else {
            continue;
        };

        // No-op fields are dropped so they trigger neither uniqueness
        // checks nor writes.
        let current = record.get(name).unwrap_or(Value::Null);
        if typecast(raw, spec.field_type) == current {
            continue;
        }

        let mut raw = raw.clone();
        if raw.is_empty_text() && spec.mandatory {
            if !T::on_update_mandatory_missing(name) {
                return Err(Error::MandatoryMissing {
                    field: name.to_string(),
                });
            }
            raw = Value::Text(String::new());
        }

        let value = typecast(&raw, spec.field_type);

        if spec.unique {
            let matches = Record::<T>::find(
                store,
                &Filter::new().eq(name, value.clone()),
                None,
                None,
                &QueryOptions::new(),
            )?;
            if let Some(existing) = matches.first() {
                return Err(Error::UniqueFieldDuplicate {
                    fields: name.to_string(),
                    existing_id: existing_id_text(existing),
                });
            }
        }

        valid.insert(name, value);
    }

    for index in schema.unique_indexes() {
        let mut filter = Filter::new();
        let mut changing = false;
        for member in index {
            if let Some(value) = valid.get(member) {
                changing = true;
                filter = filter.eq(*member, value.clone());
            } else {
                filter = filter.eq(*member, record.get(member).unwrap_or(Value::Null));
            }
        }
        if !changing {
            continue;
        }

        let matches = Record::<T>::find(store, &filter, None, None, &QueryOptions::new())?;
        if let Some(existing) = matches.first() {
            return Err(Error::UniqueFieldDuplicate {
                fields: index.join(" & "),
                existing_id: existing_id_text(existing),
            });
        }
    }

    if valid.is_empty() {
        return Ok(valid);
    }

    if valid.get("deleted").is_some_and(|v| v.as_int() == 1) {
        valid.insert("delete_ts", Value::Text(now_datetime()));
    }
    if schema.has_field("update_ts") {
        valid.insert("update_ts", Value::Text(now_datetime()));
    }

    Ok(valid)
}

fn existing_id_text<T: RecordType>(record: &Record<T>) -> String {
    record
        .id()
        .map(|id| id.to_text())
        .unwrap_or_else(|_| "?".to_string())
}
