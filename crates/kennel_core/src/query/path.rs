//! Attribute path resolution against entity schemas.
//!
//! # Invariants
//! - A resolved path is either a direct attribute or exactly one relation
//!   hop followed by an attribute of the related entity.
//! - Direct attributes take precedence over traversals with the same
//!   spelling.

use crate::model::schema::{AttributeSchema, EntitySchema, RelationSchema};
use crate::query::{QueryError, QueryResult};
use std::fmt::{Display, Formatter};

/// Attribute reference validated against a root entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPath {
    pub relation: Option<&'static RelationSchema>,
    pub attribute: &'static AttributeSchema,
}

impl ResolvedPath {
    /// Resolves a dotted path such as `name` or `address.city`.
    pub fn parse(root: &'static EntitySchema, dotted: &str) -> QueryResult<Self> {
        let mut segments = dotted.split('.');
        let first = segments.next().unwrap_or_default();
        match (segments.next(), segments.next()) {
            (None, _) => Self::direct(root, first),
            (Some(attribute), None) => Self::traverse(root, first, attribute),
            (Some(_), Some(_)) => Err(unresolved(root, dotted)),
        }
    }

    pub fn direct(root: &'static EntitySchema, attribute: &str) -> QueryResult<Self> {
        root.attribute(attribute)
            .map(|attribute| Self {
                relation: None,
                attribute,
            })
            .ok_or_else(|| unresolved(root, attribute))
    }

    pub fn traverse(
        root: &'static EntitySchema,
        relation: &str,
        attribute: &str,
    ) -> QueryResult<Self> {
        let dotted = format!("{relation}.{attribute}");
        let relation = root
            .relation(relation)
            .ok_or_else(|| unresolved(root, &dotted))?;
        let attribute = relation
            .target
            .attribute(attribute)
            .ok_or_else(|| unresolved(root, &dotted))?;
        Ok(Self {
            relation: Some(relation),
            attribute,
        })
    }

    pub fn is_traversal(&self) -> bool {
        self.relation.is_some()
    }
}

impl Display for ResolvedPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.relation {
            Some(relation) => write!(f, "{}.{}", relation.name, self.attribute.name),
            None => write!(f, "{}", self.attribute.name),
        }
    }
}

pub(crate) fn unresolved(root: &EntitySchema, attribute: &str) -> QueryError {
    QueryError::UnresolvedAttribute {
        entity: root.name,
        attribute: attribute.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::ResolvedPath;
    use crate::model::dog::DOG_SCHEMA;
    use crate::query::QueryError;

    #[test]
    fn parse_resolves_direct_and_dotted_paths() {
        let direct = ResolvedPath::parse(&DOG_SCHEMA, "addressId").unwrap();
        assert!(!direct.is_traversal());
        assert_eq!(direct.attribute.column, "ADDRESS_ID");

        let dotted = ResolvedPath::parse(&DOG_SCHEMA, "address.city").unwrap();
        assert!(dotted.is_traversal());
        assert_eq!(dotted.to_string(), "address.city");
    }

    #[test]
    fn parse_rejects_unknown_and_deep_paths() {
        for input in ["color", "address.street", "address.city.name", "owner.id"] {
            let err = ResolvedPath::parse(&DOG_SCHEMA, input).unwrap_err();
            assert!(
                matches!(err, QueryError::UnresolvedAttribute { entity: "Dog", .. }),
                "{input} should be unresolved"
            );
        }
    }
}
