//! The record lifecycle engine.
//!
//! A concrete record type implements [`RecordType`] (a name, a
//! `&'static` [`Schema`], and optional hook overrides) and works with
//! instances as [`Record<T>`]. All storage access flows through a
//! [`Store`], which carries the gateway and the shared transaction
//! counter: nested operations against one store commit exactly once, at
//! the outermost level, and any failure rolls back the whole nest.
//!
//! ```rust,ignore
//! struct Person;
//!
//! impl RecordType for Person {
//!     const NAME: &'static str = "Person";
//!     fn schema() -> &'static Schema {
//!         static SCHEMA: Lazy<Schema> = Lazy::new(|| {
//!             Schema::new("person")
//!                 .with_id_field("id")
//!                 .with_field("id", FieldSpec::int().no_insert().no_update())
//!                 .with_field("name", FieldSpec::text().mandatory().unique())
//!         });
//!         &SCHEMA
//!     }
//! }
//!
//! let person = Record::<Person>::create(&store, SetMap::new().with("name", "Ann"))?;
//! ```

pub mod bulk;
mod validate;

use crate::query::{Filter, Limit, QueryOptions, Sort};
use crate::schema::{FieldType, Schema};
use crate::store::Store;
use crate::value::{SetMap, Value, typecast};
use crate::{Error, Result};
use std::marker::PhantomData;

/// A concrete record type: schema plus extension hooks.
///
/// Every hook defaults to the conservative behavior: permission checks
/// allow mutation only on editable instances, field hooks reject, and
/// post-operation hooks succeed. The `on_*` hooks return `true` to accept
/// the condition and let the operation continue; the `after_*` and
/// `before_commit` hooks propagate their own errors, so a hook that wants
/// the operation reported as failed returns the matching error variant.
pub trait RecordType: Sized {
    /// Type name used in error messages and cache markers.
    const NAME: &'static str;

    /// The declared schema. Implementations typically return a
    /// `once_cell::sync::Lazy` static.
    fn schema() -> &'static Schema;

    /// Permission check run before an insert.
    fn is_insert_allowed(record: &Record<Self>) -> bool {
        record.is_editable()
    }

    /// Permission check run before an update.
    fn is_update_allowed(record: &Record<Self>) -> bool {
        record.is_editable()
    }

    /// Permission check run before a delete (including a soft delete via
    /// `deleted = 1`).
    fn is_delete_allowed(record: &Record<Self>) -> bool {
        record.is_editable()
    }

    /// Called for an insert set-map key that is not in the schema.
    fn on_insert_field_unknown(_field: &str, _value: &Value) -> bool {
        false
    }

    /// Called for an insert set-map key that is not insertable.
    fn on_insert_field_protected(_field: &str, _value: &Value) -> bool {
        false
    }

    /// Called when a mandatory field is supplied empty on insert.
    /// Accepting coerces the value to empty text.
    fn on_insert_mandatory_missing(_field: &str) -> bool {
        false
    }

    /// Called for an update set-map key that is not in the schema.
    fn on_update_field_unknown(_field: &str, _value: &Value) -> bool {
        false
    }

    /// Called for an update set-map key that is not updatable.
    fn on_update_field_protected(_field: &str, _value: &Value) -> bool {
        false
    }

    /// Called when a mandatory field is supplied empty on update.
    fn on_update_mandatory_missing(_field: &str) -> bool {
        false
    }

    /// Runs after a successful insert, inside the transaction.
    ///
    /// `given` is the caller's original set map, `executed` the validated
    /// map that was persisted.
    ///
    /// # Errors
    ///
    /// Any error aborts and rolls back the insert.
    fn after_insert(
        _record: &Record<Self>,
        _store: &Store,
        _given: &SetMap,
        _executed: &SetMap,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after a successful update, inside the transaction.
    ///
    /// `previous` is the typecast projection of the record before the
    /// write.
    ///
    /// # Errors
    ///
    /// Any error aborts and rolls back the update.
    fn after_update(
        _record: &Record<Self>,
        _store: &Store,
        _given: &SetMap,
        _executed: &SetMap,
        _previous: &SetMap,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after a successful delete, inside the transaction.
    ///
    /// # Errors
    ///
    /// Any error aborts and rolls back the delete.
    fn after_delete(_record: &Record<Self>, _store: &Store) -> Result<()> {
        Ok(())
    }

    /// Runs once per nest, just before the outermost commit closes the
    /// engine transaction.
    ///
    /// # Errors
    ///
    /// Any error aborts and rolls back the whole nest.
    fn before_commit(_store: &Store) -> Result<()> {
        Ok(())
    }
}

/// One in-memory record instance of type `T`.
///
/// `data` holds the last known persisted state (or the composed state for
/// detached instances); reads typecast through the schema. Instances
/// composed directly from external data are not editable and reject every
/// mutation.
pub struct Record<T: RecordType> {
    data: SetMap,
    transients: SetMap,
    editable: bool,
    _type: PhantomData<T>,
}

impl<T: RecordType> std::fmt::Debug for Record<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("type", &T::NAME)
            .field("data", &self.data)
            .field("editable", &self.editable)
            .finish()
    }
}

impl<T: RecordType> Clone for Record<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            transients: self.transients.clone(),
            editable: self.editable,
            _type: PhantomData,
        }
    }
}

impl<T: RecordType> Record<T> {
    // ----- instantiation ---------------------------------------------------

    /// Builds a detached instance from external data, without touching
    /// storage. Composed instances are not editable.
    #[must_use]
    pub fn compose(data: SetMap) -> Self {
        Self {
            data,
            transients: SetMap::new(),
            editable: false,
            _type: PhantomData,
        }
    }

    /// Creates a new record in storage.
    ///
    /// Validates the set map, inserts, reloads the persisted row, and
    /// commits; the returned instance carries the stored state (defaults
    /// applied, id populated).
    ///
    /// # Errors
    ///
    /// Returns the validation error for a rejected set map,
    /// [`Error::InsertForbidden`] when the permission hook declines, and
    /// [`Error::InsertFailed`] or the underlying error when the write
    /// fails. Any failure rolls back the transaction nest.
    pub fn create(store: &Store, data: SetMap) -> Result<Self> {
        let mut record = Self::compose(data);
        record.editable = true;
        record.insert(store)?;
        Ok(record)
    }

    /// Loads a single record by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when the schema declares no id field, and
    /// [`Error::RecordNotFound`] when no row (or more than one) matches.
    pub fn load(store: &Store, id: impl Into<Value>) -> Result<Self> {
        Self::load_with(store, id, &QueryOptions::new())
    }

    /// [`Record::load`] with explicit query options.
    ///
    /// # Errors
    ///
    /// As [`Record::load`].
    pub fn load_with(store: &Store, id: impl Into<Value>, options: &QueryOptions) -> Result<Self> {
        let id_field = Self::id_field()?;
        Self::find_one_with(store, id_field, id, options)
    }

    /// Finds records matching a filter.
    ///
    /// Each row hydrates into an editable instance (the data originates
    /// from a direct table read). Row order is storage order unless `sort`
    /// is given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] when the query fails.
    pub fn find(
        store: &Store,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<Limit>,
        options: &QueryOptions,
    ) -> Result<Vec<Self>> {
        let rows = store
            .gateway()
            .select(T::schema().table(), &[], filter, sort, limit, options)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut record = Self::compose(row);
                record.editable = true;
                record
            })
            .collect())
    }

    /// Finds the single record where `field = value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] when zero or more than one record
    /// matches; ambiguity is treated as not-found.
    pub fn find_one(store: &Store, field: &str, value: impl Into<Value>) -> Result<Self> {
        Self::find_one_with(store, field, value, &QueryOptions::new())
    }

    /// [`Record::find_one`] with explicit query options.
    ///
    /// # Errors
    ///
    /// As [`Record::find_one`].
    pub fn find_one_with(
        store: &Store,
        field: &str,
        value: impl Into<Value>,
        options: &QueryOptions,
    ) -> Result<Self> {
        let value = value.into();
        let filter = Filter::new().eq(field, value.clone());
        // Fetch two rows so an ambiguous second match is observable.
        let mut matches = Self::find(store, &filter, None, Some(Limit::first(2)), options)?;
        if matches.len() == 1 {
            Ok(matches.remove(0))
        } else {
            Err(Error::RecordNotFound {
                record: T::NAME.to_string(),
                detail: format!("no unique match for {field} = {}", value.to_text()),
            })
        }
    }

    /// Finds every record of the type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] when the query fails.
    pub fn all(store: &Store, options: &QueryOptions) -> Result<Vec<Self>> {
        Self::find(store, &Filter::new(), None, None, options)
    }

    // ----- storage interaction ---------------------------------------------

    fn insert(&mut self, store: &Store) -> Result<()> {
        if !T::is_insert_allowed(self) {
            return Err(Error::InsertForbidden);
        }

        let given = self.data.clone();
        let executed = validate::validate_insert::<T>(store, &given)?;

        store.begin_work()?;
        match self.run_insert(store, &given, &executed) {
            Ok(()) => Ok(()),
            Err(e) => {
                store.rollback_work();
                Err(e)
            },
        }
    }

    fn run_insert(&mut self, store: &Store, given: &SetMap, executed: &SetMap) -> Result<()> {
        let id = store
            .gateway()
            .insert(T::schema().table(), executed, &QueryOptions::new())?;
        if id <= 0 {
            return Err(Error::InsertFailed);
        }

        // Overwrite in-memory state with what the table actually holds,
        // bypassing the cache.
        let fresh = Self::load_with(store, id, &QueryOptions::new().cached(false))?;
        self.data = fresh.data;

        store.mark_updated(T::NAME);
        T::after_insert(self, store, given, executed)?;
        Self::commit_level(store)
    }

    /// Applies a set map to the stored row.
    ///
    /// Only fields whose typecast value differs from the current state are
    /// written; an update that changes nothing is a no-op success without
    /// any SQL. On success the instance is reloaded from storage (not
    /// merely patched).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpdateForbidden`] when the permission hook
    /// declines, [`Error::DeleteForbidden`] when `deleted = 1` is set
    /// without delete permission, the validation error for a rejected set
    /// map, and [`Error::UpdateFailed`] or the underlying error when the
    /// write fails. Any failure rolls back the transaction nest.
    pub fn update(&mut self, store: &Store, set_map: SetMap) -> Result<()> {
        if !T::is_update_allowed(self) {
            return Err(Error::UpdateForbidden);
        }

        let given = set_map;
        let executed = validate::validate_update::<T>(store, self, &given)?;
        if executed.is_empty() {
            tracing::debug!(record = T::NAME, "update with no changed fields, skipping write");
            return Ok(());
        }

        let previous = self.data_map(false, &[]);
        let id_field = Self::id_field()?;
        let id = self.id()?;

        store.begin_work()?;
        match self.run_update(store, id_field, id, &given, &executed, &previous) {
            Ok(()) => Ok(()),
            Err(e) => {
                store.rollback_work();
                Err(e)
            },
        }
    }

    fn run_update(
        &mut self,
        store: &Store,
        id_field: &'static str,
        id: Value,
        given: &SetMap,
        executed: &SetMap,
        previous: &SetMap,
    ) -> Result<()> {
        let affected = store.gateway().update(
            T::schema().table(),
            &Filter::new().eq(id_field, id),
            executed,
        )?;
        if affected != 1 {
            return Err(Error::UpdateFailed);
        }

        self.reload(store)?;
        store.mark_updated(T::NAME);
        T::after_update(self, store, given, executed, previous)?;
        Self::commit_level(store)
    }

    /// Deletes the stored row.
    ///
    /// On success the instance becomes permanently non-editable and its id
    /// field is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeleteForbidden`] when the permission hook
    /// declines, and [`Error::DeleteFailed`] or the underlying error when
    /// the write fails. Any failure rolls back the transaction nest and
    /// leaves the instance untouched.
    pub fn delete(&mut self, store: &Store) -> Result<()> {
        if !T::is_delete_allowed(self) {
            return Err(Error::DeleteForbidden);
        }

        let id_field = Self::id_field()?;
        let id = self.id()?;

        store.begin_work()?;
        match self.run_delete(store, id_field, id) {
            Ok(()) => Ok(()),
            Err(e) => {
                store.rollback_work();
                Err(e)
            },
        }
    }

    fn run_delete(&mut self, store: &Store, id_field: &'static str, id: Value) -> Result<()> {
        let affected = store
            .gateway()
            .delete(T::schema().table(), &Filter::new().eq(id_field, id))?;
        if affected != 1 {
            return Err(Error::DeleteFailed);
        }

        store.mark_updated(T::NAME);
        T::after_delete(self, store)?;
        Self::commit_level(store)?;

        self.editable = false;
        self.data.insert(id_field, Value::Null);
        Ok(())
    }

    /// Re-fetches the record's state by id, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] with a record-identifying message
    /// when the row is gone; any other failure propagates unchanged.
    pub fn reload(&mut self, store: &Store) -> Result<()> {
        let id = self.id()?;
        match Self::load_with(store, id.clone(), &QueryOptions::new().cached(false)) {
            Ok(fresh) => {
                self.data = fresh.data;
                Ok(())
            },
            Err(Error::RecordNotFound { .. }) => Err(Error::RecordNotFound {
                record: T::NAME.to_string(),
                detail: format!("record #{} is no longer in the table", id.to_text()),
            }),
            Err(e) => Err(e),
        }
    }

    /// Runs the pre-commit hook at the outermost level, then leaves one
    /// transaction level.
    fn commit_level(store: &Store) -> Result<()> {
        if store.is_outermost() {
            T::before_commit(store)?;
        }
        store.commit_work()
    }

    // ----- state access ----------------------------------------------------

    /// Reads a field, typecast through the schema.
    ///
    /// Non-schema keys present in the data (composed instances) read as
    /// text. Declared transient attributes resolve after schema fields.
    /// Returns `None` for unknown fields and unset transients.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        if let Some(raw) = self.data.get(field) {
            let field_type = T::schema()
                .field(field)
                .map_or(FieldType::Text, |spec| spec.field_type);
            return Some(typecast(raw, field_type));
        }
        if T::schema().transient(field).is_some() {
            return self.transients.get(field).cloned();
        }
        None
    }

    /// The record's primary-key value (`Value::Null` when unset).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when the schema declares no id field.
    pub fn id(&self) -> Result<Value> {
        let id_field = Self::id_field()?;
        Ok(self.get(id_field).unwrap_or(Value::Null))
    }

    /// Writes a field: schema fields go through a one-field [`update`],
    /// declared transients write the side-table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldUnknown`] for undeclared names, otherwise the
    /// update's error.
    ///
    /// [`update`]: Record::update
    pub fn set(&mut self, store: &Store, field: &str, value: impl Into<Value>) -> Result<()> {
        if T::schema().has_field(field) {
            let mut set_map = SetMap::new();
            set_map.insert(field, value);
            return self.update(store, set_map);
        }
        self.set_transient(field, value)
    }

    /// Writes a declared transient attribute, typecast to its declared
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldUnknown`] when the name is not declared.
    pub fn set_transient(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let Some(field_type) = T::schema().transient(name) else {
            return Err(Error::FieldUnknown {
                field: name.to_string(),
            });
        };
        self.transients
            .insert(name.to_string(), typecast(&value.into(), field_type));
        Ok(())
    }

    /// Projects the record to a plain map.
    ///
    /// With `hide_internals` only selectable fields are included. A
    /// non-empty `fields` list restricts the projection to those fields,
    /// and names outside the schema (e.g. transients) are appended after
    /// the schema-ordered ones.
    #[must_use]
    pub fn data_map(&self, hide_internals: bool, fields: &[&str]) -> SetMap {
        let schema = T::schema();
        let names = if hide_internals {
            schema.public_field_names(&[])
        } else {
            schema.field_names()
        };

        let mut map = SetMap::new();
        for name in names {
            if !fields.is_empty() && !fields.contains(&name) {
                continue;
            }
            map.insert(name, self.get(name).unwrap_or(Value::Null));
        }
        for field in fields {
            if !map.contains(field) {
                map.insert(*field, self.get(field).unwrap_or(Value::Null));
            }
        }
        map
    }

    /// Whether the instance may mutate storage.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        self.editable
    }

    /// The raw (un-typecast) state.
    #[must_use]
    pub const fn data(&self) -> &SetMap {
        &self.data
    }

    fn id_field() -> Result<&'static str> {
        T::schema().id_field().ok_or_else(|| {
            Error::Schema(format!("{} does not declare an id field", T::NAME))
        })
    }
}
