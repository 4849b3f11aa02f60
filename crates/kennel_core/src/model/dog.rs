//! Dog entity.
//!
//! # Invariants
//! - `name` is required and must not be blank.
//! - `age` is non-negative when set.
//! - `address_id` is a plain foreign-key scalar; the store does not enforce
//!   it. The `address` relation resolves it only inside queries.

use crate::model::address::ADDRESS_SCHEMA;
use crate::model::schema::{AttributeKind, AttributeSchema, Entity, EntitySchema, RelationSchema};
use crate::model::{EntityId, ValidationError};
use crate::query::value::QueryValue;
use crate::repo::RepoResult;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub static DOG_SCHEMA: EntitySchema = EntitySchema {
    name: "Dog",
    table: "JS_DOGS",
    id_attribute: "id",
    attributes: &[
        AttributeSchema {
            name: "id",
            column: "id",
            kind: AttributeKind::Integer,
        },
        AttributeSchema {
            name: "name",
            column: "DOG_NAME",
            kind: AttributeKind::Text,
        },
        AttributeSchema {
            name: "age",
            column: "age",
            kind: AttributeKind::Integer,
        },
        AttributeSchema {
            name: "birth",
            column: "birth",
            kind: AttributeKind::Timestamp,
        },
        AttributeSchema {
            name: "addressId",
            column: "ADDRESS_ID",
            kind: AttributeKind::Integer,
        },
    ],
    relations: &[RelationSchema {
        name: "address",
        join_attribute: "addressId",
        target: &ADDRESS_SCHEMA,
    }],
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dog {
    pub id: Option<EntityId>,
    pub name: String,
    pub age: Option<i64>,
    /// Unix epoch milliseconds.
    pub birth: Option<i64>,
    pub address_id: Option<EntityId>,
}

impl Dog {
    /// Creates a transient dog with only a name and age set.
    pub fn new(name: impl Into<String>, age: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            age: Some(age),
            birth: None,
            address_id: None,
        }
    }

    pub fn born_at(mut self, epoch_ms: i64) -> Self {
        self.birth = Some(epoch_ms);
        self
    }

    pub fn living_at(mut self, address_id: EntityId) -> Self {
        self.address_id = Some(address_id);
        self
    }
}

impl Entity for Dog {
    fn schema() -> &'static EntitySchema {
        &DOG_SCHEMA
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn data_values(&self) -> Vec<QueryValue> {
        vec![
            QueryValue::Text(self.name.clone()),
            QueryValue::from(self.age),
            self.birth.map_or(QueryValue::Null, QueryValue::Timestamp),
            QueryValue::from(self.address_id),
        ]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("DOG_NAME")?,
            age: row.get("age")?,
            birth: row.get("birth")?,
            address_id: row.get("ADDRESS_ID")?,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("Dog", "name", "must not be blank"));
        }
        if let Some(age) = self.age {
            if age < 0 {
                return Err(ValidationError::new(
                    "Dog",
                    "age",
                    format!("must be non-negative, got {age}"),
                ));
            }
        }
        Ok(())
    }
}
