//! Kennel store bootstrap: connections that repositories can use as-is.
//!
//! # Responsibility
//! - Hand out connections for a file or in-memory store, with the busy
//!   timeout from [`crate::config::StoreConfig`] already applied.
//! - Create and upgrade the `JS_DOGS` and `JPA_ADDRESS` tables.
//!
//! # Invariants
//! - `PRAGMA user_version` equals [`migrations::latest_version`] on every
//!   returned connection; a store written by a newer build is refused with
//!   [`DbError::UnsupportedSchemaVersion`] instead of being downgraded.
//! - Repositories and transaction scopes only ever receive bootstrapped
//!   connections; nothing in `repo` creates tables.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_with_config};

pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening or migrating the store.
///
/// Failures after bootstrap surface as `RepoError` with an entity and
/// operation attached.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was migrated by a newer kennel build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "kennel schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;
    use std::error::Error;

    #[test]
    fn newer_schema_error_names_both_versions() {
        let err = DbError::UnsupportedSchemaVersion {
            db_version: 4,
            latest_supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "kennel schema version 4 is newer than supported 1"
        );
        assert!(err.source().is_none());

        let err = DbError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.source().is_some());
    }
}
