//! Dog repository: typed derived and literal queries over `JS_DOGS`.
//!
//! # Responsibility
//! - Declare the dog queries once and validate them at construction.
//! - Expose the generic facade through `Deref` for CRUD and paging.
//!
//! # Invariants
//! - Every declared method name and literal query is resolved before the
//!   first repository instance is handed out; a bad declaration fails
//!   construction, not the first call.

use crate::model::address::Address;
use crate::model::dog::Dog;
use crate::model::schema::Entity;
use crate::model::EntityId;
use crate::query::literal::{CompiledQuery, LiteralQuery, Params};
use crate::query::method_name::resolve_cached;
use crate::query::value::QueryValue;
use crate::query::QueryResult;
use crate::repo::entity_repo::{at_most_one, CrudRepository, SqliteRepository};
use crate::repo::tx::TxScope;
use crate::repo::RepoResult;
use log::info;
use once_cell::sync::OnceCell;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

const DERIVED_METHODS: &[&str] = &[
    "findByName",
    "findByNameStartingWithAndIdLessThan",
    "findByNameEndingWithAndIdLessThan",
    "findByAgeInOrBirthLessThan",
    "findByAddressId",
    "findByAddress_Id",
];

static DOG_QUERIES: OnceCell<DogQueries> = OnceCell::new();

/// Compiled literal queries declared for dogs.
struct DogQueries {
    max_id_dog: CompiledQuery,
    by_name_and_age_positional: CompiledQuery,
    by_age_and_name_named: CompiledQuery,
    by_name_containing: CompiledQuery,
    count: CompiledQuery,
    update_age: CompiledQuery,
}

impl DogQueries {
    fn compile() -> QueryResult<Self> {
        for method in DERIVED_METHODS {
            resolve_cached(method, Dog::schema())?;
        }
        let queries = Self {
            max_id_dog: LiteralQuery::entity(
                "select d from Dog d where d.id = (select max(d2.id) from Dog d2)",
            )
            .compile()?,
            by_name_and_age_positional: LiteralQuery::entity(
                "select d from Dog d where d.name = ?1 and d.age = ?2",
            )
            .compile()?,
            by_age_and_name_named: LiteralQuery::entity(
                "select d from Dog d where d.name = :name and d.age = :age",
            )
            .compile()?,
            by_name_containing: LiteralQuery::entity("select d from Dog d where d.name like %:name%")
                .compile()?,
            count: LiteralQuery::native("select count(id) from JS_DOGS").compile()?,
            update_age: LiteralQuery::entity("update Dog d set d.age = :age where d.id = :id")
                .compile()?,
        };
        info!(
            "event=repository_ready module=repo status=ok entity=Dog derived={} literal=6",
            DERIVED_METHODS.len()
        );
        Ok(queries)
    }
}

/// A dog together with its resolved address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DogWithAddress {
    pub dog: Dog,
    /// `None` when the dog has no address or the referenced row is gone.
    pub address: Option<Address>,
}

pub struct DogRepository<'a> {
    inner: SqliteRepository<'a, Dog>,
    queries: &'static DogQueries,
}

impl<'a> DogRepository<'a> {
    /// Repository in autocommit mode.
    ///
    /// # Errors
    /// - `Query` when a declared query fails to resolve.
    pub fn try_new(conn: &'a Connection) -> RepoResult<Self> {
        Self::with_inner(SqliteRepository::new(conn))
    }

    pub fn try_in_scope(scope: &'a TxScope<'_>) -> RepoResult<Self> {
        Self::with_inner(SqliteRepository::in_scope(scope))
    }

    fn with_inner(inner: SqliteRepository<'a, Dog>) -> RepoResult<Self> {
        let queries = DOG_QUERIES.get_or_try_init(DogQueries::compile)?;
        Ok(Self { inner, queries })
    }

    /// The dog called `name`.
    ///
    /// # Errors
    /// - `InvalidData` when several dogs share the name.
    pub fn find_by_name(&self, name: &str) -> RepoResult<Option<Dog>> {
        let found = self.inner.find_by("findByName", vec![name.into()])?;
        at_most_one(found, Dog::schema().name)
    }

    /// `name LIKE 'prefix%' AND id < max_id`.
    pub fn find_by_name_starting_with_and_id_less_than(
        &self,
        prefix: &str,
        max_id: EntityId,
    ) -> RepoResult<Vec<Dog>> {
        self.inner.find_by(
            "findByNameStartingWithAndIdLessThan",
            vec![prefix.into(), max_id.into()],
        )
    }

    pub fn find_by_name_ending_with_and_id_less_than(
        &self,
        suffix: &str,
        max_id: EntityId,
    ) -> RepoResult<Vec<Dog>> {
        self.inner.find_by(
            "findByNameEndingWithAndIdLessThan",
            vec![suffix.into(), max_id.into()],
        )
    }

    /// `age IN ages OR birth < born_before` (epoch ms).
    pub fn find_by_age_in_or_birth_less_than(
        &self,
        ages: Vec<i64>,
        born_before: i64,
    ) -> RepoResult<Vec<Dog>> {
        self.inner.find_by(
            "findByAgeInOrBirthLessThan",
            vec![QueryValue::from(ages), born_before.into()],
        )
    }

    /// Matches the `addressId` column directly.
    pub fn find_by_address_id(&self, address_id: EntityId) -> RepoResult<Vec<Dog>> {
        self.inner.find_by("findByAddressId", vec![address_id.into()])
    }

    /// Matches through the `address` relation; dogs whose address row does
    /// not exist are excluded.
    pub fn find_by_address_traversal_id(&self, address_id: EntityId) -> RepoResult<Vec<Dog>> {
        self.inner.find_by("findByAddress_Id", vec![address_id.into()])
    }

    pub fn find_max_id_dog(&self) -> RepoResult<Option<Dog>> {
        self.inner.run_one(&self.queries.max_id_dog, &Params::none())
    }

    pub fn query_by_name_and_age_positional(&self, name: &str, age: i64) -> RepoResult<Vec<Dog>> {
        let params = Params::Positional(vec![name.into(), age.into()]);
        self.inner
            .run_list(&self.queries.by_name_and_age_positional, &params)
    }

    pub fn query_by_age_and_name_named(&self, age: i64, name: &str) -> RepoResult<Vec<Dog>> {
        let params = Params::named([("age", QueryValue::from(age)), ("name", name.into())]);
        self.inner.run_list(&self.queries.by_age_and_name_named, &params)
    }

    pub fn query_by_name_containing(&self, fragment: &str) -> RepoResult<Vec<Dog>> {
        let params = Params::named([("name", fragment)]);
        self.inner.run_list(&self.queries.by_name_containing, &params)
    }

    /// Native row count of `JS_DOGS`.
    pub fn query_count(&self) -> RepoResult<i64> {
        self.inner.run_count(&self.queries.count, &Params::none())
    }

    /// Sets the age of dog `id`; returns the number of updated rows.
    ///
    /// # Errors
    /// - `ReadOnlyTransaction` outside a read-write scope.
    pub fn update_dog_age(&self, age: i64, id: EntityId) -> RepoResult<usize> {
        let params = Params::named([("age", age), ("id", id)]);
        self.inner.run_modifying(&self.queries.update_age, &params)
    }

    /// Loads dog `id` and resolves its address.
    pub fn find_with_address(&self, id: EntityId) -> RepoResult<Option<DogWithAddress>> {
        let Some(dog) = self.inner.find_by_id(id)? else {
            return Ok(None);
        };
        let address = match dog.address_id {
            Some(address_id) => {
                SqliteRepository::<Address>::new(self.inner.connection()).find_by_id(address_id)?
            }
            None => None,
        };
        Ok(Some(DogWithAddress { dog, address }))
    }
}

impl<'a> Deref for DogRepository<'a> {
    type Target = SqliteRepository<'a, Dog>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
