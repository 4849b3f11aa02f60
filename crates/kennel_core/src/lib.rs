//! Typed repository layer over SQLite for the kennel store.
//!
//! Entities describe their table mapping statically; repositories derive
//! queries from method names, specifications and literal query text, and
//! services run use cases inside explicit transaction scopes.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;

pub use config::{ConfigError, DatabaseLocation, LoggingConfig, StoreConfig};
pub use db::{open_db, open_db_in_memory, open_with_config, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::address::Address;
pub use model::dog::Dog;
pub use model::schema::{Entity, EntitySchema};
pub use model::{EntityId, ValidationError};
pub use query::literal::{LiteralQuery, Params};
pub use query::page::{Direction, Order, Page, PageRequest, Sort};
pub use query::predicate::{Predicate, Root, Specification};
pub use query::value::QueryValue;
pub use query::{QueryError, QueryResult};
pub use repo::dog_repo::{DogRepository, DogWithAddress};
pub use repo::entity_repo::{CrudRepository, SqliteRepository, ValueRow};
pub use repo::tx::{TxMode, TxScope};
pub use repo::{ErrorContext, RepoError, RepoResult};
pub use service::dog_service::DogService;

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
