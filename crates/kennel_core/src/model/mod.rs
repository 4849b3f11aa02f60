//! Entity model and static schema descriptions.
//!
//! # Responsibility
//! - Define the persisted records (`Dog`, `Address`).
//! - Describe their table mapping explicitly through [`EntitySchema`].
//!
//! # Invariants
//! - Identity is store-assigned and immutable once set.
//! - Every write validates the record first.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod address;
pub mod dog;
pub mod schema;

use address::ADDRESS_SCHEMA;
use dog::DOG_SCHEMA;
use schema::EntitySchema;

/// Identity type shared by every entity (SQLite `INTEGER PRIMARY KEY`).
pub type EntityId = i64;

static ENTITIES: &[&EntitySchema] = &[&DOG_SCHEMA, &ADDRESS_SCHEMA];

/// Returns every entity schema known to this crate.
pub fn registered_entities() -> &'static [&'static EntitySchema] {
    ENTITIES
}

/// Finds an entity schema by its query-language name (`Dog`).
pub fn find_entity(name: &str) -> Option<&'static EntitySchema> {
    ENTITIES.iter().copied().find(|schema| schema.name == name)
}

/// Write-side validation failure for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub entity: &'static str,
    pub attribute: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(entity: &'static str, attribute: &'static str, message: impl Into<String>) -> Self {
        Self {
            entity,
            attribute,
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}.{}: {}", self.entity, self.attribute, self.message)
    }
}

impl Error for ValidationError {}
