//! Repository layer: generic entity persistence over SQLite.
//!
//! # Responsibility
//! - Expose CRUD, paging, specification and literal-query execution for any
//!   schema-described entity.
//! - Enforce transaction-scope rules for writes.
//! - Classify store failures with the entity and operation they came from.
//!
//! # Invariants
//! - Entity writes call `Entity::validate()` before any SQL runs.
//! - Store errors are never retried here.

use crate::db::DbError;
use crate::model::{EntityId, ValidationError};
use crate::query::QueryError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod dog_repo;
pub mod entity_repo;
pub mod tx;

pub type RepoResult<T> = Result<T, RepoError>;

/// Where a store failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorContext {
    pub entity: &'static str,
    pub operation: &'static str,
}

impl ErrorContext {
    pub const fn new(entity: &'static str, operation: &'static str) -> Self {
        Self { entity, operation }
    }

    /// Context for conversions that happen outside a named operation, such
    /// as row mapping.
    pub const UNSCOPED: Self = Self::new("-", "-");
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.entity, self.operation)
    }
}

/// Repository error taxonomy.
#[derive(Debug)]
pub enum RepoError {
    /// Resolver, builder, literal-query or paging error.
    Query(QueryError),
    Validation(ValidationError),
    /// Write attempted without an active read-write scope.
    ReadOnlyTransaction(ErrorContext),
    /// Identity/uniqueness/NOT NULL/CHECK conflict reported by the store.
    ConstraintViolation {
        context: ErrorContext,
        message: String,
    },
    /// Transient infrastructure failure (busy, locked, I/O, cannot open).
    Connection {
        context: ErrorContext,
        source: DbError,
    },
    Db {
        context: ErrorContext,
        source: DbError,
    },
    NotFound {
        entity: &'static str,
        id: EntityId,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::ReadOnlyTransaction(context) => write!(
                f,
                "{context} requires a read-write transaction scope"
            ),
            Self::ConstraintViolation { context, message } => {
                write!(f, "{context} violated a store constraint: {message}")
            }
            Self::Connection { context, source } => {
                write!(f, "{context} failed to reach the store: {source}")
            }
            Self::Db { context, source } => write!(f, "{context} failed: {source}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Query(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Connection { source, .. } | Self::Db { source, .. } => Some(source),
            Self::ReadOnlyTransaction(_)
            | Self::ConstraintViolation { .. }
            | Self::NotFound { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => classify(err, ErrorContext::UNSCOPED),
            other => Self::Db {
                context: ErrorContext::UNSCOPED,
                source: other,
            },
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        classify(value, ErrorContext::UNSCOPED)
    }
}

/// Maps a SQLite failure onto the repository taxonomy.
pub fn classify(err: rusqlite::Error, context: ErrorContext) -> RepoError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
        _ => None,
    };
    match code {
        Some(ErrorCode::ConstraintViolation) => RepoError::ConstraintViolation {
            context,
            message: err.to_string(),
        },
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase,
        ) => RepoError::Connection {
            context,
            source: DbError::Sqlite(err),
        },
        _ => RepoError::Db {
            context,
            source: DbError::Sqlite(err),
        },
    }
}

/// Attaches an [`ErrorContext`] to raw SQLite results.
pub(crate) trait StoreResultExt<T> {
    fn in_context(self, context: ErrorContext) -> RepoResult<T>;
}

impl<T> StoreResultExt<T> for Result<T, rusqlite::Error> {
    fn in_context(self, context: ErrorContext) -> RepoResult<T> {
        self.map_err(|err| classify(err, context))
    }
}
