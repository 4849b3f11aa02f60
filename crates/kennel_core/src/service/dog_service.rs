//! Dog use-case service with declarative transaction scopes.
//!
//! # Responsibility
//! - Run each use case inside exactly one [`TxScope`].
//! - Commit on success and roll back on any error.
//!
//! # Invariants
//! - A failed use case leaves the store unchanged.
//! - Read-only use cases never write, even through literal queries.

use crate::model::address::Address;
use crate::model::dog::Dog;
use crate::model::EntityId;
use crate::query::page::{Page, PageRequest};
use crate::repo::dog_repo::DogRepository;
use crate::repo::entity_repo::{CrudRepository, SqliteRepository};
use crate::repo::tx::{TxMode, TxScope};
use crate::repo::RepoResult;
use log::warn;
use rusqlite::Connection;

/// Use-case service owning exclusive access to one connection.
pub struct DogService<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> DogService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Runs `f` against a dog repository bound to a fresh scope.
    ///
    /// # Contract
    /// - `Ok` commits; `Err` rolls back and returns the original error.
    /// - A panic inside `f` drops the scope, which rolls back.
    pub fn transactional<T>(
        &mut self,
        mode: TxMode,
        f: impl FnOnce(&DogRepository<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        self.in_scope(mode, |scope| {
            let repo = DogRepository::try_in_scope(scope)?;
            f(&repo)
        })
    }

    pub fn save_dog(&mut self, dog: Dog) -> RepoResult<Dog> {
        self.transactional(TxMode::ReadWrite, |repo| repo.save(dog))
    }

    /// Saves all dogs or none.
    pub fn save_dogs(&mut self, dogs: Vec<Dog>) -> RepoResult<Vec<Dog>> {
        self.transactional(TxMode::ReadWrite, |repo| repo.save_all(dogs))
    }

    pub fn update_dog_age(&mut self, age: i64, id: EntityId) -> RepoResult<usize> {
        self.transactional(TxMode::ReadWrite, |repo| repo.update_dog_age(age, id))
    }

    pub fn save_address(&mut self, address: Address) -> RepoResult<Address> {
        self.in_scope(TxMode::ReadWrite, |scope| {
            SqliteRepository::<Address>::in_scope(scope).save(address)
        })
    }

    pub fn find_page(&mut self, request: &PageRequest) -> RepoResult<Page<Dog>> {
        self.transactional(TxMode::ReadOnly, |repo| repo.find_page(request))
    }

    fn in_scope<T>(
        &mut self,
        mode: TxMode,
        f: impl FnOnce(&TxScope<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let scope = TxScope::begin(self.conn, mode)?;
        match f(&scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                let tx_id = scope.id();
                if let Err(rollback_err) = scope.rollback() {
                    warn!(
                        "event=tx_rollback module=service status=error tx_id={} error={} cause={}",
                        tx_id, rollback_err, err
                    );
                }
                Err(err)
            }
        }
    }
}
