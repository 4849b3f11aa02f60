//! Query construction: derived method names, specifications, literal query
//! text, paging and SQL rendering.
//!
//! # Responsibility
//! - Turn every query form into a validated, parameterized SQLite statement.
//! - Surface resolution problems synchronously as [`QueryError`].
//!
//! # Invariants
//! - Attribute names are always checked against the entity schema before any
//!   SQL is produced; no caller text reaches SQL unvalidated except native
//!   literal queries.
//! - Values are bound as parameters, never spliced into SQL text.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod literal;
pub mod method_name;
pub mod page;
pub mod path;
pub mod predicate;
pub mod sql;
pub mod value;

pub type QueryResult<T> = Result<T, QueryError>;

/// Resolution and binding errors raised before any statement executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Method name does not follow `findBy|getBy|readBy|countBy|existsBy` +
    /// PascalCase clauses.
    InvalidMethodName { method: String, reason: String },
    /// Attribute does not match a declared field or relation traversal.
    UnresolvedAttribute {
        entity: &'static str,
        attribute: String,
    },
    /// Argument count differs from the value slots the query requires.
    ArityMismatch {
        query: String,
        expected: usize,
        actual: usize,
    },
    /// Argument shape does not fit the slot (list vs scalar).
    InvalidArgument { clause: String, message: String },
    InvalidPageRequest { page: i64, size: i64 },
    UnknownEntity(String),
    /// Statement kind is not supported by literal queries (e.g. `insert`).
    UnsupportedStatement(String),
    MalformedQuery { query: String, message: String },
    MissingParameter(String),
    /// Query text mixes `:name` and `?N` placeholders, or binding style does
    /// not match the placeholders.
    MixedParameterStyles(String),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMethodName { method, reason } => {
                write!(f, "invalid query method name `{method}`: {reason}")
            }
            Self::UnresolvedAttribute { entity, attribute } => {
                write!(f, "unresolved attribute `{attribute}` on entity {entity}")
            }
            Self::ArityMismatch {
                query,
                expected,
                actual,
            } => write!(
                f,
                "query `{query}` expects {expected} argument(s), got {actual}"
            ),
            Self::InvalidArgument { clause, message } => {
                write!(f, "invalid argument for `{clause}`: {message}")
            }
            Self::InvalidPageRequest { page, size } => write!(
                f,
                "invalid page request: page={page} size={size} (page must be >= 0, size > 0)"
            ),
            Self::UnknownEntity(name) => write!(f, "unknown entity `{name}`"),
            Self::UnsupportedStatement(kind) => {
                write!(f, "unsupported literal statement `{kind}`; use save instead")
            }
            Self::MalformedQuery { query, message } => {
                write!(f, "malformed query `{query}`: {message}")
            }
            Self::MissingParameter(name) => write!(f, "missing query parameter `{name}`"),
            Self::MixedParameterStyles(query) => write!(
                f,
                "query `{query}` mixes named and positional parameter styles"
            ),
        }
    }
}

impl Error for QueryError {}
