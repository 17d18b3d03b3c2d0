//! Statement compilation.
//!
//! Pure functions that compile filters, sort specs, and limits into
//! finished SQL text for the `SQLite` dialect. All value interpolation
//! goes through the codec in [`crate::value`]; identifiers are
//! double-quoted. The gateway is the only caller.

use crate::value::{self, SetMap, SqlKind, Value};
use serde::{Deserialize, Serialize};

/// One WHERE predicate.
///
/// Filters AND their predicates together. Equality renders the value by
/// its runtime type (integer and float literals stay numeric, everything
/// else is escaped text); LIKE renders the pattern as escaped text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// `"field" = <value>`
    Eq {
        /// Column name.
        field: String,
        /// Comparison value.
        value: Value,
    },
    /// `"field" LIKE '<pattern>'`
    Like {
        /// Column name.
        field: String,
        /// LIKE pattern, escaped as a text literal when compiled.
        pattern: String,
    },
}

/// A conjunction of per-field predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// An empty filter (matches every row).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Adds an equality predicate.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a LIKE predicate.
    #[must_use]
    pub fn like(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.predicates.push(Predicate::Like {
            field: field.into(),
            pattern: pattern.into(),
        });
        self
    }

    /// Returns true when no predicates are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Iterates the predicates in order.
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }
}

/// Sort direction for one ORDER BY term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// An ordered list of ORDER BY terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    terms: Vec<(String, SortDirection)>,
}

impl Sort {
    /// An empty sort spec.
    #[must_use]
    pub const fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Appends a sort term.
    #[must_use]
    pub fn by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.terms.push((field.into(), direction));
        self
    }

    /// Returns true when no terms are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// A skip/amount window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    /// Rows to skip.
    pub skip: u64,
    /// Maximum rows to return.
    pub amount: u64,
}

impl Limit {
    /// A window starting at `skip` returning at most `amount` rows.
    #[must_use]
    pub const fn new(skip: u64, amount: u64) -> Self {
        Self { skip, amount }
    }

    /// The first `amount` rows.
    #[must_use]
    pub const fn first(amount: u64) -> Self {
        Self { skip: 0, amount }
    }
}

/// Per-call gateway options.
///
/// `use_cache` and `table_prefix` default to the gateway-level settings
/// when unset; `replace` and `ignore_duplicate` select the insert
/// statement form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Per-call cache override; `None` defers to the gateway default.
    pub use_cache: Option<bool>,
    /// Per-call table-prefix override.
    pub table_prefix: Option<String>,
    /// Compile `REPLACE INTO` instead of `INSERT INTO`.
    pub replace: bool,
    /// Compile `INSERT OR IGNORE INTO` instead of `INSERT INTO`.
    pub ignore_duplicate: bool,
}

impl QueryOptions {
    /// Options with every setting deferred to the gateway defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the cache on or off for this call.
    #[must_use]
    pub const fn cached(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }

    /// Overrides the table prefix for this call.
    #[must_use]
    pub fn prefixed(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    /// Selects the `REPLACE INTO` statement form.
    #[must_use]
    pub const fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }

    /// Selects the `INSERT OR IGNORE INTO` statement form.
    #[must_use]
    pub const fn ignoring_duplicates(mut self) -> Self {
        self.ignore_duplicate = true;
        self
    }
}

/// Double-quotes an identifier, doubling any embedded quote.
///
/// Identifiers normally come from schema constants; the doubling is a
/// guard against a stray quote ever reaching statement text unescaped.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Compiles a filter into WHERE-clause text (without the `WHERE` keyword).
///
/// Returns an empty string for an empty filter. Equality predicates render
/// integers and floats as numeric literals and everything else as escaped
/// text, matching the loose comparison the original storage applied.
#[must_use]
pub fn build_where(filter: &Filter) -> String {
    let clauses: Vec<String> = filter
        .predicates()
        .map(|predicate| match predicate {
            Predicate::Eq { field, value } => {
                let rendered = match value {
                    Value::Int(_) => value::render(value, SqlKind::Int),
                    Value::Float(_) => value::render(value, SqlKind::Float),
                    Value::Null => "NULL".to_string(),
                    _ => value::render(value, SqlKind::Text),
                };
                format!("{} = {}", quote_ident(field), rendered)
            },
            Predicate::Like { field, pattern } => {
                format!("{} LIKE {}", quote_ident(field), value::quote_text(pattern))
            },
        })
        .collect();
    clauses.join(" AND ")
}

/// Compiles a SELECT statement.
///
/// An empty field list selects `*`. Sort terms compile in order; the limit
/// compiles to the `LIMIT skip,amount` form.
#[must_use]
pub fn build_select(
    table: &str,
    fields: &[&str],
    filter: &Filter,
    sort: Option<&Sort>,
    limit: Option<Limit>,
) -> String {
    let mut sql = String::from("SELECT ");

    if fields.is_empty() {
        sql.push('*');
    } else {
        let quoted: Vec<String> = fields.iter().map(|f| quote_ident(f)).collect();
        sql.push_str(&quoted.join(", "));
    }

    sql.push_str(" FROM ");
    sql.push_str(&quote_ident(table));

    let where_clause = build_where(filter);
    if !where_clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }

    if let Some(sort) = sort {
        if !sort.is_empty() {
            let terms: Vec<String> = sort
                .terms
                .iter()
                .map(|(field, direction)| {
                    let dir = match direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {}", quote_ident(field), dir)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
    }

    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {},{}", limit.skip, limit.amount));
    }

    sql
}

/// Compiles an INSERT statement.
///
/// The statement form follows the options: `REPLACE INTO` wins over
/// `INSERT OR IGNORE INTO`, which wins over plain `INSERT INTO`. The set
/// map must be non-empty; the gateway enforces that before compiling.
#[must_use]
pub fn build_insert(table: &str, set_map: &SetMap, options: &QueryOptions) -> String {
    debug_assert!(!set_map.is_empty(), "insert needs at least one field");

    let verb = if options.replace {
        "REPLACE INTO"
    } else if options.ignore_duplicate {
        "INSERT OR IGNORE INTO"
    } else {
        "INSERT INTO"
    };

    let mut columns = Vec::with_capacity(set_map.len());
    let mut values = Vec::with_capacity(set_map.len());
    for (field, value) in set_map.iter() {
        columns.push(quote_ident(field));
        values.push(value::render_auto(value));
    }

    format!(
        "{} {} ({}) VALUES ({})",
        verb,
        quote_ident(table),
        columns.join(", "),
        values.join(", ")
    )
}

/// Compiles an UPDATE statement.
#[must_use]
pub fn build_update(table: &str, filter: &Filter, set_map: &SetMap) -> String {
    debug_assert!(!set_map.is_empty(), "update needs at least one field");

    let assignments: Vec<String> = set_map
        .iter()
        .map(|(field, value)| format!("{} = {}", quote_ident(field), value::render_auto(value)))
        .collect();

    let mut sql = format!(
        "UPDATE {} SET {}",
        quote_ident(table),
        assignments.join(", ")
    );

    let where_clause = build_where(filter);
    if !where_clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }

    sql
}

/// Compiles a DELETE statement.
#[must_use]
pub fn build_delete(table: &str, filter: &Filter) -> String {
    let mut sql = format!("DELETE FROM {}", quote_ident(table));

    let where_clause = build_where(filter);
    if !where_clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }

    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_types_values() {
        let filter = Filter::new()
            .eq("id", 7)
            .eq("score", 1.5)
            .eq("name", "Ann")
            .like("title", "%ow%");
        assert_eq!(
            build_where(&filter),
            "\"id\" = 7 AND \"score\" = 1.5 AND \"name\" = 'Ann' AND \"title\" LIKE '%ow%'"
        );
    }

    #[test]
    fn where_clause_escapes_text() {
        let filter = Filter::new().eq("name", "O'Brien");
        assert_eq!(build_where(&filter), "\"name\" = 'O''Brien'");
        assert_eq!(build_where(&Filter::new()), "");
    }

    #[test]
    fn select_minimal() {
        let sql = build_select("pre_person", &[], &Filter::new(), None, None);
        assert_eq!(sql, "SELECT * FROM \"pre_person\"");
    }

    #[test]
    fn select_full() {
        let filter = Filter::new().eq("age", 30);
        let sort = Sort::new()
            .by("name", SortDirection::Asc)
            .by("age", SortDirection::Desc);
        let sql = build_select(
            "person",
            &["id", "name"],
            &filter,
            Some(&sort),
            Some(Limit::new(10, 20)),
        );
        assert_eq!(
            sql,
            "SELECT \"id\", \"name\" FROM \"person\" WHERE \"age\" = 30 \
             ORDER BY \"name\" ASC, \"age\" DESC LIMIT 10,20"
        );
    }

    #[test]
    fn insert_forms() {
        let set = SetMap::new().with("name", "Ann").with("age", 30);
        assert_eq!(
            build_insert("person", &set, &QueryOptions::new()),
            "INSERT INTO \"person\" (\"name\", \"age\") VALUES ('Ann', 30)"
        );
        assert_eq!(
            build_insert("person", &set, &QueryOptions::new().ignoring_duplicates()),
            "INSERT OR IGNORE INTO \"person\" (\"name\", \"age\") VALUES ('Ann', 30)"
        );
        assert_eq!(
            build_insert("person", &set, &QueryOptions::new().replacing()),
            "REPLACE INTO \"person\" (\"name\", \"age\") VALUES ('Ann', 30)"
        );
    }

    #[test]
    fn update_statement() {
        let set = SetMap::new().with("age", 31).with("note", Value::Null);
        let filter = Filter::new().eq("id", 1);
        assert_eq!(
            build_update("person", &filter, &set),
            "UPDATE \"person\" SET \"age\" = 31, \"note\" = NULL WHERE \"id\" = 1"
        );
    }

    #[test]
    fn delete_statement() {
        let filter = Filter::new().eq("id", 1);
        assert_eq!(
            build_delete("person", &filter),
            "DELETE FROM \"person\" WHERE \"id\" = 1"
        );
        assert_eq!(build_delete("person", &Filter::new()), "DELETE FROM \"person\"");
    }

    #[test]
    fn identifier_quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident("na\"me"), "\"na\"\"me\"");
    }
}
