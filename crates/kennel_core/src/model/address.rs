//! Address entity.

use crate::model::schema::{AttributeKind, AttributeSchema, Entity, EntitySchema};
use crate::model::{EntityId, ValidationError};
use crate::query::value::QueryValue;
use crate::repo::RepoResult;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub static ADDRESS_SCHEMA: EntitySchema = EntitySchema {
    name: "Address",
    table: "JPA_ADDRESS",
    id_attribute: "id",
    attributes: &[
        AttributeSchema {
            name: "id",
            column: "id",
            kind: AttributeKind::Integer,
        },
        AttributeSchema {
            name: "province",
            column: "province",
            kind: AttributeKind::Text,
        },
        AttributeSchema {
            name: "city",
            column: "city",
            kind: AttributeKind::Text,
        },
    ],
    relations: &[],
};

/// Postal location a dog may be registered at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: Option<EntityId>,
    pub province: Option<String>,
    pub city: Option<String>,
}

impl Address {
    pub fn new(province: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            id: None,
            province: Some(province.into()),
            city: Some(city.into()),
        }
    }
}

impl Entity for Address {
    fn schema() -> &'static EntitySchema {
        &ADDRESS_SCHEMA
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn data_values(&self) -> Vec<QueryValue> {
        vec![
            QueryValue::from(self.province.clone()),
            QueryValue::from(self.city.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            province: row.get("province")?,
            city: row.get("city")?,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for (attribute, value) in [("province", &self.province), ("city", &self.city)] {
            if value.as_deref().is_some_and(|text| text.trim().is_empty()) {
                return Err(ValidationError::new(
                    "Address",
                    attribute,
                    "must not be blank when set",
                ));
            }
        }
        Ok(())
    }
}
