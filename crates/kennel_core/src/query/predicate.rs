//! Predicate trees and the specification builder.
//!
//! # Responsibility
//! - Represent filters as a boolean expression tree over resolved attribute
//!   paths, independent of how they were produced.
//! - Let callers compose type-checked filters at runtime through
//!   [`Root`]/[`Path`] and the [`Specification`] trait.
//!
//! # Invariants
//! - Every leaf references a [`ResolvedPath`]; paths can only be obtained
//!   through schema validation.
//! - Comparing against `NULL` becomes an explicit null check.

use crate::model::schema::{Entity, EntitySchema, RelationSchema};
use crate::query::path::{unresolved, ResolvedPath};
use crate::query::value::QueryValue;
use crate::query::QueryResult;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Boolean filter expression over one root entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        path: ResolvedPath,
        op: Comparison,
        value: QueryValue,
    },
    /// `pattern` uses `%`/`_` wildcards with `\` as escape character.
    Like {
        path: ResolvedPath,
        pattern: String,
    },
    In {
        path: ResolvedPath,
        values: Vec<QueryValue>,
    },
    Between {
        path: ResolvedPath,
        low: QueryValue,
        high: QueryValue,
    },
    IsNull(ResolvedPath),
    IsNotNull(ResolvedPath),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            single => Self::And(vec![single, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            single => Self::Or(vec![single, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Self::Not(Box::new(self))
    }

    /// Conjunction of all parts; a single part is returned unwrapped.
    pub fn all(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts.into_iter().collect();
        if parts.len() == 1 {
            return parts.remove(0);
        }
        Self::And(parts)
    }

    /// Disjunction of all parts; a single part is returned unwrapped.
    pub fn any(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts.into_iter().collect();
        if parts.len() == 1 {
            return parts.remove(0);
        }
        Self::Or(parts)
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compare { path, op, value } => write!(f, "{path} {} {value}", op.as_sql()),
            Self::Like { path, pattern } => {
                write!(f, "{path} LIKE {}", QueryValue::Text(pattern.clone()))
            }
            Self::In { path, values } => {
                write!(f, "{path} IN {}", QueryValue::List(values.clone()))
            }
            Self::Between { path, low, high } => write!(f, "{path} BETWEEN {low} AND {high}"),
            Self::IsNull(path) => write!(f, "{path} IS NULL"),
            Self::IsNotNull(path) => write!(f, "{path} IS NOT NULL"),
            Self::And(parts) => write_joined(f, parts, " AND ", |part| {
                matches!(part, Self::Or(_))
            }),
            Self::Or(parts) => write_joined(f, parts, " OR ", |_| false),
            Self::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

fn write_joined(
    f: &mut Formatter<'_>,
    parts: &[Predicate],
    separator: &str,
    needs_parens: impl Fn(&Predicate) -> bool,
) -> std::fmt::Result {
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        if needs_parens(part) {
            write!(f, "({part})")?;
        } else {
            write!(f, "{part}")?;
        }
    }
    Ok(())
}

/// Query root handed to specifications; the entry point for paths.
pub struct Root<E> {
    schema: &'static EntitySchema,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Root<E> {
    pub fn new() -> Self {
        Self {
            schema: E::schema(),
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// Path to a directly declared attribute.
    pub fn get(&self, attribute: &str) -> QueryResult<Path> {
        ResolvedPath::direct(self.schema, attribute).map(Path::new)
    }

    pub fn join(&self, relation: &str) -> QueryResult<Join> {
        let resolved = self
            .schema
            .relation(relation)
            .ok_or_else(|| unresolved(self.schema, relation))?;
        Ok(Join {
            root: self.schema,
            relation: resolved,
        })
    }
}

impl<E: Entity> Default for Root<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Relation hop from the root entity.
pub struct Join {
    root: &'static EntitySchema,
    relation: &'static RelationSchema,
}

impl Join {
    pub fn get(&self, attribute: &str) -> QueryResult<Path> {
        ResolvedPath::traverse(self.root, self.relation.name, attribute).map(Path::new)
    }
}

/// Validated attribute reference that builds leaf predicates.
#[derive(Debug, Clone, Copy)]
pub struct Path {
    resolved: ResolvedPath,
}

impl Path {
    fn new(resolved: ResolvedPath) -> Self {
        Self { resolved }
    }

    pub fn resolved(&self) -> ResolvedPath {
        self.resolved
    }

    pub fn eq(&self, value: impl Into<QueryValue>) -> Predicate {
        match value.into() {
            QueryValue::Null => Predicate::IsNull(self.resolved),
            value => self.compare(Comparison::Eq, value),
        }
    }

    pub fn ne(&self, value: impl Into<QueryValue>) -> Predicate {
        match value.into() {
            QueryValue::Null => Predicate::IsNotNull(self.resolved),
            value => self.compare(Comparison::Ne, value),
        }
    }

    pub fn lt(&self, value: impl Into<QueryValue>) -> Predicate {
        self.compare(Comparison::Lt, value.into())
    }

    pub fn le(&self, value: impl Into<QueryValue>) -> Predicate {
        self.compare(Comparison::Le, value.into())
    }

    pub fn gt(&self, value: impl Into<QueryValue>) -> Predicate {
        self.compare(Comparison::Gt, value.into())
    }

    pub fn ge(&self, value: impl Into<QueryValue>) -> Predicate {
        self.compare(Comparison::Ge, value.into())
    }

    /// Raw LIKE pattern; `%` and `_` keep their wildcard meaning.
    pub fn like(&self, pattern: impl Into<String>) -> Predicate {
        Predicate::Like {
            path: self.resolved,
            pattern: pattern.into(),
        }
    }

    pub fn starts_with(&self, prefix: &str) -> Predicate {
        self.like(format!("{}%", escape_like(prefix)))
    }

    pub fn ends_with(&self, suffix: &str) -> Predicate {
        self.like(format!("%{}", escape_like(suffix)))
    }

    pub fn contains(&self, fragment: &str) -> Predicate {
        self.like(format!("%{}%", escape_like(fragment)))
    }

    pub fn is_in<T: Into<QueryValue>>(&self, values: impl IntoIterator<Item = T>) -> Predicate {
        Predicate::In {
            path: self.resolved,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn between(&self, low: impl Into<QueryValue>, high: impl Into<QueryValue>) -> Predicate {
        Predicate::Between {
            path: self.resolved,
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn is_null(&self) -> Predicate {
        Predicate::IsNull(self.resolved)
    }

    pub fn is_not_null(&self) -> Predicate {
        Predicate::IsNotNull(self.resolved)
    }

    fn compare(&self, op: Comparison, value: QueryValue) -> Predicate {
        Predicate::Compare {
            path: self.resolved,
            op,
            value,
        }
    }
}

/// Escapes LIKE wildcards so `value` matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Caller-composed dynamic filter over entity `E`.
pub trait Specification<E: Entity> {
    fn to_predicate(&self, root: &Root<E>) -> QueryResult<Predicate>;
}

impl<E, F> Specification<E> for F
where
    E: Entity,
    F: Fn(&Root<E>) -> QueryResult<Predicate>,
{
    fn to_predicate(&self, root: &Root<E>) -> QueryResult<Predicate> {
        self(root)
    }
}
