//! SQLite statement rendering for schema-described entities.
//!
//! # Invariants
//! - The root table is always aliased `root`; relation hops join as
//!   `rel_<relation>` with `LEFT JOIN`, so a missing related row never
//!   hides the root row.
//! - All values are emitted as `?` placeholders with params in order.

use crate::model::schema::{EntitySchema, RelationSchema};
use crate::query::page::Direction;
use crate::query::path::ResolvedPath;
use crate::query::predicate::Predicate;
use crate::query::value::QueryValue;
use rusqlite::types::Value;

pub(crate) const ROOT_ALIAS: &str = "root";

/// Rendered SQL text plus positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Row window applied to a select.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub limit: u32,
    pub offset: u64,
}

struct SqlBuilder {
    root: &'static EntitySchema,
    params: Vec<Value>,
    joins: Vec<&'static RelationSchema>,
}

impl SqlBuilder {
    fn new(root: &'static EntitySchema) -> Self {
        Self {
            root,
            params: Vec::new(),
            joins: Vec::new(),
        }
    }

    fn column(&mut self, path: &ResolvedPath) -> String {
        match path.relation {
            Some(relation) => {
                if !self.joins.iter().any(|joined| joined.name == relation.name) {
                    self.joins.push(relation);
                }
                format!("rel_{}.{}", relation.name, path.attribute.column)
            }
            None => format!("{ROOT_ALIAS}.{}", path.attribute.column),
        }
    }

    fn bind(&mut self, value: &QueryValue) -> String {
        let values = value.sql_values();
        let marks = vec!["?"; values.len()].join(", ");
        self.params.extend(values);
        if value.is_list() {
            format!("({marks})")
        } else {
            marks
        }
    }

    fn predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::Compare { path, op, value } => {
                let column = self.column(path);
                format!("{column} {} {}", op.as_sql(), self.bind(value))
            }
            Predicate::Like { path, pattern } => {
                let column = self.column(path);
                self.params.push(Value::Text(pattern.clone()));
                format!("{column} LIKE ? ESCAPE '\\'")
            }
            Predicate::In { path, values } => {
                if values.is_empty() {
                    return "0 = 1".to_string();
                }
                let column = self.column(path);
                let placeholders: Vec<String> = values.iter().map(|value| self.bind(value)).collect();
                format!("{column} IN ({})", placeholders.join(", "))
            }
            Predicate::Between { path, low, high } => {
                let column = self.column(path);
                let low = self.bind(low);
                let high = self.bind(high);
                format!("{column} BETWEEN {low} AND {high}")
            }
            Predicate::IsNull(path) => format!("{} IS NULL", self.column(path)),
            Predicate::IsNotNull(path) => format!("{} IS NOT NULL", self.column(path)),
            Predicate::And(parts) => self.joined(parts, " AND ", "1 = 1"),
            Predicate::Or(parts) => self.joined(parts, " OR ", "0 = 1"),
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(inner)),
        }
    }

    fn joined(&mut self, parts: &[Predicate], separator: &str, empty: &str) -> String {
        if parts.is_empty() {
            return empty.to_string();
        }
        let rendered: Vec<String> = parts.iter().map(|part| self.predicate(part)).collect();
        format!("({})", rendered.join(separator))
    }

    fn order_by(&mut self, sort: &[(ResolvedPath, Direction)]) -> String {
        let keys: Vec<String> = sort
            .iter()
            .map(|(path, direction)| format!("{} {}", self.column(path), direction.as_sql()))
            .collect();
        keys.join(", ")
    }

    fn from_clause(&self) -> String {
        let mut from = format!("{} AS {ROOT_ALIAS}", self.root.table);
        for relation in &self.joins {
            let local_column = self
                .root
                .attribute(relation.join_attribute)
                .map_or(relation.join_attribute, |attribute| attribute.column);
            from.push_str(&format!(
                " LEFT JOIN {table} AS rel_{name} ON rel_{name}.{target_id} = {ROOT_ALIAS}.{local_column}",
                table = relation.target.table,
                name = relation.name,
                target_id = relation.target.id().column,
            ));
        }
        from
    }
}

/// Column list mapping every attribute of `schema` under `alias`, each
/// exposed by its bare column name so `Entity::from_row` can read it.
pub(crate) fn projection(schema: &EntitySchema, alias: &str) -> String {
    schema
        .attributes
        .iter()
        .map(|attribute| format!("{alias}.{col} AS {col}", col = attribute.column))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn select_statement(
    schema: &'static EntitySchema,
    filter: Option<&Predicate>,
    sort: &[(ResolvedPath, Direction)],
    window: Option<Window>,
) -> Statement {
    let mut builder = SqlBuilder::new(schema);
    let where_clause = filter.map(|predicate| builder.predicate(predicate));
    let order_clause = builder.order_by(sort);

    let mut sql = format!(
        "SELECT {} FROM {}",
        projection(schema, ROOT_ALIAS),
        builder.from_clause()
    );
    if let Some(where_clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }
    if !order_clause.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_clause);
    }
    if let Some(window) = window {
        sql.push_str(" LIMIT ? OFFSET ?");
        builder.params.push(Value::Integer(i64::from(window.limit)));
        builder
            .params
            .push(Value::Integer(i64::try_from(window.offset).unwrap_or(i64::MAX)));
    }

    Statement {
        sql,
        params: builder.params,
    }
}

pub(crate) fn count_statement(schema: &'static EntitySchema, filter: Option<&Predicate>) -> Statement {
    let mut builder = SqlBuilder::new(schema);
    let where_clause = filter.map(|predicate| builder.predicate(predicate));
    let mut sql = format!("SELECT COUNT(*) FROM {}", builder.from_clause());
    if let Some(where_clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clause);
    }
    Statement {
        sql,
        params: builder.params,
    }
}

pub(crate) fn insert_sql(schema: &EntitySchema) -> String {
    let columns: Vec<&str> = schema
        .data_attributes()
        .map(|attribute| attribute.column)
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table,
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    )
}

/// Insert-or-update by identity; identity is the first bound value.
pub(crate) fn upsert_sql(schema: &EntitySchema) -> String {
    let id_column = schema.id().column;
    let columns: Vec<&str> = schema
        .data_attributes()
        .map(|attribute| attribute.column)
        .collect();
    let updates: Vec<String> = columns
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect();
    format!(
        "INSERT INTO {table} ({id_column}, {columns}) VALUES ({placeholders}) \
         ON CONFLICT({id_column}) DO UPDATE SET {updates}",
        table = schema.table,
        columns = columns.join(", "),
        placeholders = vec!["?"; columns.len() + 1].join(", "),
        updates = updates.join(", "),
    )
}

pub(crate) fn delete_by_id_sql(schema: &EntitySchema) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?1",
        schema.table,
        schema.id().column
    )
}
