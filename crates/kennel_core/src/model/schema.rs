//! Static entity schema descriptions.
//!
//! # Responsibility
//! - Describe how each entity maps onto a table: identity, attributes,
//!   column names and relations.
//! - Provide the lookup surface used by query resolution and SQL rendering.
//!
//! # Invariants
//! - Attribute names are camelCase and unique within one entity.
//! - Every relation names a local attribute holding the foreign key and a
//!   target entity whose identity it references.
//! - The identity attribute is always an `Integer` attribute.

use crate::model::{EntityId, ValidationError};
use crate::query::value::QueryValue;
use crate::repo::RepoResult;
use rusqlite::Row;

/// Storage kind of one scalar attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Integer,
    Text,
    /// Unix epoch milliseconds stored as INTEGER.
    Timestamp,
}

impl AttributeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        }
    }
}

/// One mapped scalar attribute.
#[derive(Debug, PartialEq, Eq)]
pub struct AttributeSchema {
    /// Attribute name as written in queries (`addressId`).
    pub name: &'static str,
    /// Column name in the backing table (`ADDRESS_ID`).
    pub column: &'static str,
    pub kind: AttributeKind,
}

/// Many-to-one relation resolved through a local foreign-key attribute.
#[derive(Debug, PartialEq, Eq)]
pub struct RelationSchema {
    /// Relation name as written in queries (`address`).
    pub name: &'static str,
    /// Local attribute holding the foreign key.
    pub join_attribute: &'static str,
    pub target: &'static EntitySchema,
}

/// Mapping of one entity type onto one table.
#[derive(Debug, PartialEq, Eq)]
pub struct EntitySchema {
    /// Entity name as written in literal queries (`Dog`).
    pub name: &'static str,
    pub table: &'static str,
    /// Name of the identity attribute. Must be listed in `attributes`.
    pub id_attribute: &'static str,
    pub attributes: &'static [AttributeSchema],
    pub relations: &'static [RelationSchema],
}

impl EntitySchema {
    /// Looks up a directly declared attribute by exact name.
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSchema> {
        let attributes: &'static [AttributeSchema] = self.attributes;
        attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationSchema> {
        let relations: &'static [RelationSchema] = self.relations;
        relations.iter().find(|relation| relation.name == name)
    }

    /// Identity attribute. Schemas are declared statically, so a missing
    /// identity is a declaration bug and falls back to the first attribute.
    pub fn id(&self) -> &'static AttributeSchema {
        let attributes: &'static [AttributeSchema] = self.attributes;
        attributes
            .iter()
            .find(|attribute| attribute.name == self.id_attribute)
            .unwrap_or(&attributes[0])
    }

    /// Attributes other than identity, in declaration order.
    pub fn data_attributes(&self) -> impl Iterator<Item = &'static AttributeSchema> + '_ {
        let attributes: &'static [AttributeSchema] = self.attributes;
        attributes
            .iter()
            .filter(move |attribute| attribute.name != self.id_attribute)
    }
}

/// Mapping contract between a Rust record and its [`EntitySchema`].
///
/// # Invariants
/// - `data_values` yields one value per `schema().data_attributes()` entry,
///   in the same order.
/// - `from_row` reads columns by the schema column names.
pub trait Entity: Sized {
    fn schema() -> &'static EntitySchema;

    /// Store-assigned identity; `None` while transient.
    fn id(&self) -> Option<EntityId>;

    /// Records the identity assigned by the store.
    fn assign_id(&mut self, id: EntityId);

    fn data_values(&self) -> Vec<QueryValue>;

    fn from_row(row: &Row<'_>) -> RepoResult<Self>;

    /// Checks write-side invariants. Called before every insert/update.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}
