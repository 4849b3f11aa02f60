//! Literal query text: entity-path queries and native SQL.
//!
//! # Responsibility
//! - Compile entity-path query text (`select d from Dog d where d.name =
//!   :name`) into SQLite SQL validated against entity schemas.
//! - Pass native SQL through untouched apart from parameter placeholders.
//!   Text inside single-quoted string literals is never rewritten.
//! - Bind named (`:name`) or positional (`?1`) parameters.
//!
//! # Invariants
//! - Only `select`, `update` and `delete` statements are accepted; inserts
//!   must go through `save`.
//! - One query uses one placeholder style.
//! - Entity-path queries never reference an undeclared attribute.

use crate::model::find_entity;
use crate::model::schema::EntitySchema;
use crate::query::path::unresolved;
use crate::query::sql::projection;
use crate::query::value::QueryValue;
use crate::query::{QueryError, QueryResult};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rusqlite::types::Value;

static PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(%?)(?::([A-Za-z_][A-Za-z0-9_]*)|\?([0-9]+))(%?)").expect("valid param regex")
});
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(from|update)\s+([A-Za-z_]\w*)(?:\s+(?:as\s+)?([A-Za-z_]\w*))?")
        .expect("valid entity regex")
});
static PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*)\.([A-Za-z_]\w*)(?:\.([A-Za-z_]\w*))?").expect("valid path regex")
});
static PROJECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*select\s+(distinct\s+)?([A-Za-z_]\w*)\s+from\b")
        .expect("valid projection regex")
});
static COUNT_ALIAS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bcount\s*\(\s*([A-Za-z_]\w*)\s*\)").expect("valid count regex")
});

/// Words that can follow `from Entity` but are not aliases.
const CLAUSE_KEYWORDS: &[&str] = &[
    "where", "set", "order", "group", "having", "limit", "join", "left", "inner", "on", "union",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Update,
    Delete,
}

/// How result rows map back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Rows carry every column of the entity, readable by `Entity::from_row`.
    Entity(&'static EntitySchema),
    /// Untyped rows (aggregates, projections, native SQL).
    Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParameterLayout {
    None,
    /// Placeholder names in order of appearance; names may repeat.
    Named(Vec<String>),
    /// 1-based positions in order of appearance.
    Positional(Vec<usize>),
}

/// Declared query text, compiled once with [`LiteralQuery::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralQuery {
    text: String,
    native: bool,
}

impl LiteralQuery {
    /// Entity-path query validated against the registered schemas.
    pub fn entity(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            native: false,
        }
    }

    /// Raw SQLite SQL; bypasses attribute validation, returns untyped rows.
    pub fn native(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            native: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_native(&self) -> bool {
        self.native
    }

    pub fn compile(&self) -> QueryResult<CompiledQuery> {
        let source = self.text.trim();
        let kind = statement_kind(source)?;
        let (sql, params) = rewrite_parameters(source)?;

        if self.native {
            return Ok(CompiledQuery {
                source: source.to_string(),
                sql,
                kind,
                shape: ResultShape::Scalar,
                params,
            });
        }

        let (sql, aliases) = rewrite_entities(source, &sql, kind)?;
        let sql = rewrite_paths(&sql, &aliases)?;
        let (sql, shape) = rewrite_projection(&sql, &aliases, kind)?;

        Ok(CompiledQuery {
            source: source.to_string(),
            sql,
            kind,
            shape,
            params,
        })
    }
}

/// Compiled literal query ready for binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub source: String,
    pub sql: String,
    pub kind: StatementKind,
    pub shape: ResultShape,
    params: ParameterLayout,
}

impl CompiledQuery {
    pub fn is_modifying(&self) -> bool {
        matches!(self.kind, StatementKind::Update | StatementKind::Delete)
    }

    /// Resolves caller parameters into positional SQLite bind values.
    ///
    /// # Errors
    /// - `MixedParameterStyles` when the binding style differs from the
    ///   placeholders.
    /// - `MissingParameter` for an unbound `:name`.
    /// - `ArityMismatch` for surplus named values or a wrong positional count.
    /// - `InvalidArgument` for a list value; literal placeholders are
    ///   scalar, `In` lists go through derived queries or `Path::is_in`.
    pub(crate) fn bind(&self, params: &Params) -> QueryResult<Vec<Value>> {
        match (&self.params, params) {
            (ParameterLayout::None, other) if other.is_empty() => Ok(Vec::new()),
            (ParameterLayout::None, other) => Err(self.arity_mismatch(0, other.len())),
            (ParameterLayout::Named(names), Params::Named(values)) => {
                let mut distinct: Vec<&str> = names.iter().map(String::as_str).collect();
                distinct.sort_unstable();
                distinct.dedup();
                if values.len() > distinct.len() {
                    return Err(self.arity_mismatch(distinct.len(), values.len()));
                }
                names
                    .iter()
                    .map(|name| {
                        let (_, value) = values
                            .iter()
                            .find(|(key, _)| key == name)
                            .ok_or_else(|| QueryError::MissingParameter(name.clone()))?;
                        bind_scalar(format!(":{name}"), value)
                    })
                    .collect()
            }
            (ParameterLayout::Positional(positions), Params::Positional(values)) => {
                let expected = positions.iter().copied().max().unwrap_or(0);
                if values.len() != expected {
                    return Err(self.arity_mismatch(expected, values.len()));
                }
                positions
                    .iter()
                    .map(|position| bind_scalar(format!("?{position}"), &values[position - 1]))
                    .collect()
            }
            (ParameterLayout::Named(names), Params::None) => names
                .first()
                .map_or(Ok(Vec::new()), |name| Err(QueryError::MissingParameter(name.clone()))),
            (ParameterLayout::Positional(positions), Params::None) => {
                Err(self.arity_mismatch(positions.iter().copied().max().unwrap_or(0), 0))
            }
            _ => Err(QueryError::MixedParameterStyles(self.source.clone())),
        }
    }

    fn arity_mismatch(&self, expected: usize, actual: usize) -> QueryError {
        QueryError::ArityMismatch {
            query: self.source.clone(),
            expected,
            actual,
        }
    }
}

/// Parameters supplied to a literal query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    Named(Vec<(String, QueryValue)>),
    Positional(Vec<QueryValue>),
}

impl Params {
    pub fn none() -> Self {
        Self::None
    }

    pub fn named<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<QueryValue>,
    {
        Self::Named(
            values
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn positional<V: Into<QueryValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Named(values) => values.len(),
            Self::Positional(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn bind_scalar(placeholder: String, value: &QueryValue) -> QueryResult<Value> {
    value.to_sql_value().ok_or_else(|| QueryError::InvalidArgument {
        clause: placeholder,
        message: "list values cannot bind to a literal placeholder".to_string(),
    })
}

fn statement_kind(source: &str) -> QueryResult<StatementKind> {
    let first = source
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match first.as_str() {
        "select" => Ok(StatementKind::Select),
        "update" => Ok(StatementKind::Update),
        "delete" => Ok(StatementKind::Delete),
        "insert" | "replace" | "merge" => Err(QueryError::UnsupportedStatement(first)),
        _ => Err(QueryError::MalformedQuery {
            query: source.to_string(),
            message: "expected select, update or delete".to_string(),
        }),
    }
}

/// Applies `rewrite` to the text outside single-quoted SQL strings.
///
/// An escaped `''` closes and reopens a string, so splitting on `'` keeps
/// every even segment outside quotes.
fn map_unquoted<F>(text: &str, mut rewrite: F) -> QueryResult<String>
where
    F: FnMut(&str) -> QueryResult<String>,
{
    let mut out = String::with_capacity(text.len());
    for (index, segment) in text.split('\'').enumerate() {
        if index > 0 {
            out.push('\'');
        }
        if index % 2 == 0 {
            out.push_str(&rewrite(segment)?);
        } else {
            out.push_str(segment);
        }
    }
    Ok(out)
}

fn rewrite_parameters(source: &str) -> QueryResult<(String, ParameterLayout)> {
    let mut names = Vec::new();
    let mut positions = Vec::new();
    let mut malformed = None;

    let sql = map_unquoted(source, |segment| {
        let rewritten = PARAM_RE.replace_all(segment, |caps: &Captures<'_>| {
            if let Some(name) = caps.get(2) {
                names.push(name.as_str().to_string());
            } else if let Some(position) = caps.get(3) {
                match position.as_str().parse::<usize>() {
                    Ok(position) if position > 0 => positions.push(position),
                    _ => {
                        malformed.get_or_insert_with(|| {
                            format!("invalid placeholder ?{}", position.as_str())
                        });
                    }
                }
            }
            let leading = !caps[1].is_empty();
            let trailing = !caps[4].is_empty();
            match (leading, trailing) {
                (true, true) => "('%' || ? || '%')".to_string(),
                (true, false) => "('%' || ?)".to_string(),
                (false, true) => "(? || '%')".to_string(),
                (false, false) => "?".to_string(),
            }
        });
        Ok(rewritten.into_owned())
    })?;

    if let Some(message) = malformed {
        return Err(QueryError::MalformedQuery {
            query: source.to_string(),
            message,
        });
    }

    let layout = match (names.is_empty(), positions.is_empty()) {
        (true, true) => ParameterLayout::None,
        (false, true) => ParameterLayout::Named(names),
        (true, false) => ParameterLayout::Positional(positions),
        (false, false) => return Err(QueryError::MixedParameterStyles(source.to_string())),
    };
    Ok((sql, layout))
}

/// Alias introduced by `from Entity alias` / `update Entity alias`.
struct AliasBinding {
    alias: Option<String>,
    schema: &'static EntitySchema,
    /// Root of an update/delete: columns are written unqualified.
    bare: bool,
}

fn rewrite_entities(
    source: &str,
    text: &str,
    kind: StatementKind,
) -> QueryResult<(String, Vec<AliasBinding>)> {
    let mut aliases: Vec<AliasBinding> = Vec::new();

    let out = map_unquoted(text, |segment| {
        let mut out = String::with_capacity(segment.len());
        let mut last = 0;
        for caps in ENTITY_RE.captures_iter(segment) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let keyword = caps[1].to_ascii_uppercase();
            let entity = &caps[2];
            let schema =
                find_entity(entity).ok_or_else(|| QueryError::UnknownEntity(entity.to_string()))?;
            let alias = caps
                .get(3)
                .map(|alias| alias.as_str())
                .filter(|alias| !CLAUSE_KEYWORDS.contains(&alias.to_ascii_lowercase().as_str()));
            let bare = aliases.is_empty() && kind != StatementKind::Select;

            out.push_str(&segment[last..whole.start()]);
            match alias {
                Some(alias) if !bare => {
                    out.push_str(&format!("{keyword} {} AS {alias}", schema.table));
                }
                _ => {
                    out.push_str(&format!("{keyword} {}", schema.table));
                    // Keep the keyword captured in the alias slot (`where`).
                    if let Some(trailing) = caps.get(3).filter(|_| alias.is_none()) {
                        out.push(' ');
                        out.push_str(trailing.as_str());
                    }
                }
            }
            last = whole.end();

            aliases.push(AliasBinding {
                alias: alias.map(str::to_string),
                schema,
                bare,
            });
        }
        out.push_str(&segment[last..]);
        Ok(out)
    })?;

    if aliases.is_empty() {
        return Err(QueryError::MalformedQuery {
            query: source.to_string(),
            message: "missing `from Entity alias` or `update Entity alias` clause".to_string(),
        });
    }
    Ok((out, aliases))
}

fn rewrite_paths(text: &str, aliases: &[AliasBinding]) -> QueryResult<String> {
    map_unquoted(text, |segment| {
        let mut out = String::with_capacity(segment.len());
        let mut last = 0;
        for caps in PATH_RE.captures_iter(segment) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let Some(binding) = aliases
                .iter()
                .find(|binding| binding.alias.as_deref() == Some(&caps[1]))
            else {
                continue;
            };

            out.push_str(&segment[last..whole.start()]);
            out.push_str(&resolve_path(binding, &caps)?);
            last = whole.end();
        }
        out.push_str(&segment[last..]);
        Ok(out)
    })
}

fn resolve_path(binding: &AliasBinding, caps: &Captures<'_>) -> QueryResult<String> {
    let schema = binding.schema;
    let qualify = |column: &str| match (&binding.alias, binding.bare) {
        (Some(alias), false) => format!("{alias}.{column}"),
        _ => column.to_string(),
    };

    let first = &caps[2];
    match caps.get(3) {
        None => schema
            .attribute(first)
            .map(|attribute| qualify(attribute.column))
            .ok_or_else(|| unresolved(schema, first)),
        Some(second) => {
            let dotted = format!("{first}.{}", second.as_str());
            let relation = schema
                .relation(first)
                .ok_or_else(|| unresolved(schema, &dotted))?;
            let target = relation
                .target
                .attribute(second.as_str())
                .ok_or_else(|| unresolved(schema, &dotted))?;
            let local = schema
                .attribute(relation.join_attribute)
                .ok_or_else(|| unresolved(schema, relation.join_attribute))?;
            Ok(format!(
                "(SELECT sub_{name}.{column} FROM {table} AS sub_{name} WHERE sub_{name}.{id} = {owner})",
                name = relation.name,
                column = target.column,
                table = relation.target.table,
                id = relation.target.id().column,
                owner = qualify(local.column),
            ))
        }
    }
}

fn rewrite_projection(
    text: &str,
    aliases: &[AliasBinding],
    kind: StatementKind,
) -> QueryResult<(String, ResultShape)> {
    let find = |alias: &str| {
        aliases
            .iter()
            .find(|binding| binding.alias.as_deref() == Some(alias))
    };

    let text = map_unquoted(text, |segment| {
        Ok(COUNT_ALIAS_RE
            .replace_all(segment, |caps: &Captures<'_>| match find(&caps[1]) {
                Some(binding) => format!("count({}.{})", &caps[1], binding.schema.id().column),
                None => caps[0].to_string(),
            })
            .into_owned())
    })?;

    if kind != StatementKind::Select {
        return Ok((text, ResultShape::Scalar));
    }

    let Some(caps) = PROJECTION_RE.captures(&text) else {
        return Ok((text, ResultShape::Scalar));
    };
    let (Some(selected), Some(binding)) = (caps.get(2), find(&caps[2])) else {
        return Ok((text, ResultShape::Scalar));
    };

    let mut rewritten = String::with_capacity(text.len() + 64);
    rewritten.push_str(&text[..selected.start()]);
    rewritten.push_str(&projection(binding.schema, selected.as_str()));
    rewritten.push_str(&text[selected.end()..]);
    Ok((rewritten, ResultShape::Entity(binding.schema)))
}
