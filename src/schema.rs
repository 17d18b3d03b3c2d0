//! Declarative schemas for record types.
//!
//! A [`Schema`] is declared once per concrete record type and is immutable
//! at runtime; record types hand a `&'static Schema` to the lifecycle
//! engine through [`RecordType::schema`](crate::record::RecordType::schema)
//! (typically behind a `once_cell::sync::Lazy`). The schema names the
//! table, the ordered field list with per-field policies, any composite
//! unique indexes, the primary-key field, and the declared transient
//! attributes.

use crate::value::Value;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Integer column; values coerce via numeric parsing.
    Int,
    /// Text column; values pass through as strings.
    Text,
}

/// Per-field policy flags and default.
///
/// Defaults match the conventional column: text-typed, writable and
/// selectable, not mandatory, not unique, empty-text default.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Declared type, applied on every read and during validation.
    pub field_type: FieldType,
    /// Whether the field may appear in an insert set map.
    pub insertable: bool,
    /// Whether the field may appear in an update set map.
    pub updatable: bool,
    /// Whether the field is part of the public projection.
    pub selectable: bool,
    /// Whether an empty value is rejected on write.
    pub mandatory: bool,
    /// Whether the field's value must be unique across the table.
    pub unique: bool,
    /// Value used when an insert does not supply the field.
    pub default: Value,
}

impl FieldSpec {
    /// A text field with default policies.
    #[must_use]
    pub const fn text() -> Self {
        Self {
            field_type: FieldType::Text,
            insertable: true,
            updatable: true,
            selectable: true,
            mandatory: false,
            unique: false,
            default: Value::Text(String::new()),
        }
    }

    /// An integer field with default policies and a zero default.
    #[must_use]
    pub const fn int() -> Self {
        Self {
            field_type: FieldType::Int,
            insertable: true,
            updatable: true,
            selectable: true,
            mandatory: false,
            unique: false,
            default: Value::Int(0),
        }
    }

    /// Marks the field as rejected in insert set maps.
    #[must_use]
    pub fn no_insert(mut self) -> Self {
        self.insertable = false;
        self
    }

    /// Marks the field as rejected in update set maps.
    #[must_use]
    pub fn no_update(mut self) -> Self {
        self.updatable = false;
        self
    }

    /// Excludes the field from the public projection.
    ///
    /// A hidden field that is also write-protected reports as unknown
    /// rather than protected when a caller supplies it, so its existence
    /// is not revealed.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.selectable = false;
        self
    }

    /// Rejects empty values on write.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Enforces table-wide uniqueness of the field's value.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the value used when an insert omits the field.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }
}

/// The declared shape of one table mapping.
#[derive(Debug, Clone)]
pub struct Schema {
    table: &'static str,
    id_field: Option<&'static str>,
    fields: Vec<(&'static str, FieldSpec)>,
    unique_indexes: Vec<Vec<&'static str>>,
    transients: Vec<(&'static str, FieldType)>,
}

impl Schema {
    /// Starts a schema for the given (unprefixed) table name.
    #[must_use]
    pub const fn new(table: &'static str) -> Self {
        Self {
            table,
            id_field: None,
            fields: Vec::new(),
            unique_indexes: Vec::new(),
            transients: Vec::new(),
        }
    }

    /// Appends a field. Declaration order is the order validation rebuilds
    /// set maps in.
    #[must_use]
    pub fn with_field(mut self, name: &'static str, spec: FieldSpec) -> Self {
        debug_assert!(
            !self.fields.iter().any(|(existing, _)| *existing == name),
            "field {name} declared twice"
        );
        self.fields.push((name, spec));
        self
    }

    /// Names the primary-key field.
    #[must_use]
    pub fn with_id_field(mut self, name: &'static str) -> Self {
        self.id_field = Some(name);
        self
    }

    /// Declares a composite unique index over the given fields.
    #[must_use]
    pub fn with_unique_index(mut self, fields: &[&'static str]) -> Self {
        self.unique_indexes.push(fields.to_vec());
        self
    }

    /// Declares a named, typed transient attribute.
    ///
    /// Transients live beside the row data on each instance and never
    /// reach the table.
    #[must_use]
    pub fn with_transient(mut self, name: &'static str, field_type: FieldType) -> Self {
        debug_assert!(
            self.field(name).is_none(),
            "transient {name} shadows a schema field"
        );
        self.transients.push((name, field_type));
        self
    }

    /// The unprefixed table name.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        self.table
    }

    /// The primary-key field, when the record type supports one.
    #[must_use]
    pub const fn id_field(&self) -> Option<&'static str> {
        self.id_field
    }

    /// Looks up a field's spec.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, spec)| spec)
    }

    /// Returns true when the field is declared.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterates fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (*name, spec))
    }

    /// All declared field names in order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(name, _)| *name).collect()
    }

    /// Declared composite unique indexes.
    #[must_use]
    pub fn unique_indexes(&self) -> &[Vec<&'static str>] {
        &self.unique_indexes
    }

    /// Looks up a declared transient attribute's type.
    #[must_use]
    pub fn transient(&self, name: &str) -> Option<FieldType> {
        self.transients
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, field_type)| *field_type)
    }

    /// Selectable fields, minus an explicit exclusion list.
    pub fn public_fields<'a>(
        &'a self,
        exclude: &'a [&str],
    ) -> impl Iterator<Item = (&'static str, &'a FieldSpec)> {
        self.fields()
            .filter(move |(name, spec)| spec.selectable && !exclude.contains(name))
    }

    /// Names of the selectable fields, minus an explicit exclusion list.
    #[must_use]
    pub fn public_field_names(&self, exclude: &[&str]) -> Vec<&'static str> {
        self.public_fields(exclude).map(|(name, _)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new("person")
            .with_id_field("id")
            .with_field("id", FieldSpec::int().no_insert().no_update())
            .with_field("name", FieldSpec::text().mandatory().unique())
            .with_field("age", FieldSpec::int())
            .with_field("secret", FieldSpec::text().hidden().no_insert().no_update())
            .with_unique_index(&["name", "age"])
            .with_transient("note", FieldType::Text)
    }

    #[test]
    fn spec_defaults() {
        let spec = FieldSpec::text();
        assert_eq!(spec.field_type, FieldType::Text);
        assert!(spec.insertable && spec.updatable && spec.selectable);
        assert!(!spec.mandatory && !spec.unique);
        assert_eq!(spec.default, Value::Text(String::new()));

        assert_eq!(FieldSpec::int().default, Value::Int(0));
    }

    #[test]
    fn field_lookup_and_order() {
        let schema = sample();
        assert!(schema.has_field("name"));
        assert!(!schema.has_field("missing"));
        assert_eq!(schema.id_field(), Some("id"));
        assert_eq!(schema.field_names(), vec!["id", "name", "age", "secret"]);
        assert!(schema.field("name").unwrap().unique);
    }

    #[test]
    fn public_projection_skips_hidden_and_excluded() {
        let schema = sample();
        assert_eq!(schema.public_field_names(&[]), vec!["id", "name", "age"]);
        assert_eq!(schema.public_field_names(&["age"]), vec!["id", "name"]);
    }

    #[test]
    fn transients_are_declared_and_typed() {
        let schema = sample();
        assert_eq!(schema.transient("note"), Some(FieldType::Text));
        assert_eq!(schema.transient("other"), None);
    }

    #[test]
    fn unique_indexes_are_preserved() {
        let schema = sample();
        assert_eq!(schema.unique_indexes(), &[vec!["name", "age"]]);
    }
}
