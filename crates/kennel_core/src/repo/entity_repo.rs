//! Generic SQLite repository for schema-described entities.
//!
//! # Responsibility
//! - CRUD by identity for any [`Entity`].
//! - Paging, sorting, specification, derived and literal queries.
//!
//! # Invariants
//! - Writes validate the entity first and run inside a savepoint, so a
//!   failed write never leaves partial rows behind.
//! - Writes through a read-only scope fail with `ReadOnlyTransaction` and
//!   execute nothing.
//! - `save_all` and modifying literal queries require a read-write scope.
//!
//! # See also
//! - `repo::tx` for scope semantics.

use crate::model::schema::Entity;
use crate::model::EntityId;
use crate::query::literal::{CompiledQuery, LiteralQuery, Params, ResultShape, StatementKind};
use crate::query::method_name::{resolve_cached, Subject};
use crate::query::page::{Order, Page, PageRequest, Sort};
use crate::query::predicate::{Predicate, Root, Specification};
use crate::query::sql::{
    count_statement, delete_by_id_sql, insert_sql, select_statement, upsert_sql, Statement,
    Window,
};
use crate::query::value::QueryValue;
use crate::query::QueryError;
use crate::repo::tx::{with_savepoint, TxMode, TxScope};
use crate::repo::{ErrorContext, RepoError, RepoResult, StoreResultExt};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::marker::PhantomData;
use std::time::Instant;

/// Untyped result row of a scalar or native query.
pub type ValueRow = Vec<QueryValue>;

/// Identity-based persistence contract shared by every entity repository.
pub trait CrudRepository<E: Entity> {
    /// Inserts a transient entity or upserts a persistent one; returns the
    /// entity with its identity assigned.
    fn save(&self, entity: E) -> RepoResult<E>;
    /// Saves every entity or none of them.
    fn save_all(&self, entities: Vec<E>) -> RepoResult<Vec<E>>;
    fn find_by_id(&self, id: EntityId) -> RepoResult<Option<E>>;
    fn exists_by_id(&self, id: EntityId) -> RepoResult<bool>;
    /// Entities whose identity is in `ids`, ordered by identity.
    fn find_all_by_id(&self, ids: &[EntityId]) -> RepoResult<Vec<E>>;
    fn find_all(&self) -> RepoResult<Vec<E>>;
    fn count(&self) -> RepoResult<u64>;
    /// Deletes by identity; `NotFound` when no row matched.
    fn delete_by_id(&self, id: EntityId) -> RepoResult<()>;
    /// Deletes the persistent entity; transient entities are ignored.
    fn delete(&self, entity: &E) -> RepoResult<()>;

    /// Same as [`CrudRepository::save`]; statements execute immediately, so
    /// there is no pending state to flush.
    fn save_and_flush(&self, entity: E) -> RepoResult<E> {
        self.save(entity)
    }
}

/// SQLite-backed repository over entity `E`.
///
/// Built either over a bare connection (autocommit, each write in its own
/// savepoint) or over a [`TxScope`].
pub struct SqliteRepository<'a, E> {
    conn: &'a Connection,
    mode: Option<TxMode>,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> SqliteRepository<'a, E> {
    /// Repository in autocommit mode.
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            mode: None,
            _entity: PhantomData,
        }
    }

    pub fn in_scope(scope: &'a TxScope<'_>) -> Self {
        Self {
            conn: scope.connection(),
            mode: Some(scope.mode()),
            _entity: PhantomData,
        }
    }

    /// Scope mode, or `None` in autocommit mode.
    pub fn mode(&self) -> Option<TxMode> {
        self.mode
    }

    pub(crate) fn connection(&self) -> &'a Connection {
        self.conn
    }

    pub fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        let order = sort.resolve(E::schema())?;
        let statement = select_statement(E::schema(), None, &order, None);
        self.fetch(&statement, self.context("find_all_sorted"))
    }

    pub fn find_page(&self, request: &PageRequest) -> RepoResult<Page<E>> {
        self.page_where(None, request, self.context("find_page"))
    }

    /// One page of entities matching `spec`.
    pub fn find_all_matching(
        &self,
        spec: &impl Specification<E>,
        request: &PageRequest,
    ) -> RepoResult<Page<E>> {
        let predicate = spec.to_predicate(&Root::new())?;
        self.page_where(Some(&predicate), request, self.context("find_all_matching"))
    }

    pub fn find_all_where(&self, spec: &impl Specification<E>) -> RepoResult<Vec<E>> {
        let predicate = spec.to_predicate(&Root::new())?;
        let statement = select_statement(E::schema(), Some(&predicate), &[], None);
        self.fetch(&statement, self.context("find_all_where"))
    }

    /// The single entity matching `spec`; `InvalidData` when several match.
    pub fn find_one_where(&self, spec: &impl Specification<E>) -> RepoResult<Option<E>> {
        let found = self.find_all_where(spec)?;
        at_most_one(found, E::schema().name)
    }

    pub fn count_where(&self, spec: &impl Specification<E>) -> RepoResult<u64> {
        let predicate = spec.to_predicate(&Root::new())?;
        let statement = count_statement(E::schema(), Some(&predicate));
        self.fetch_count(&statement, self.context("count_where"))
    }

    /// Runs the derived `find…By…` query named `method`.
    ///
    /// # Errors
    /// - Any resolver error for `method`, or `ArityMismatch`/`InvalidArgument`
    ///   from binding `args`.
    pub fn find_by(&self, method: &str, args: Vec<QueryValue>) -> RepoResult<Vec<E>> {
        let predicate = self.derived_predicate(method, Subject::Find, args)?;
        let statement = select_statement(E::schema(), Some(&predicate), &[], None);
        self.fetch(&statement, self.context("find_by"))
    }

    /// Derived `find…By…` query returning one page.
    pub fn find_page_by(
        &self,
        method: &str,
        args: Vec<QueryValue>,
        request: &PageRequest,
    ) -> RepoResult<Page<E>> {
        let predicate = self.derived_predicate(method, Subject::Find, args)?;
        self.page_where(Some(&predicate), request, self.context("find_page_by"))
    }

    pub fn count_by(&self, method: &str, args: Vec<QueryValue>) -> RepoResult<u64> {
        let predicate = self.derived_predicate(method, Subject::Count, args)?;
        let statement = count_statement(E::schema(), Some(&predicate));
        self.fetch_count(&statement, self.context("count_by"))
    }

    pub fn exists_by(&self, method: &str, args: Vec<QueryValue>) -> RepoResult<bool> {
        let predicate = self.derived_predicate(method, Subject::Exists, args)?;
        let statement = count_statement(E::schema(), Some(&predicate));
        Ok(self.fetch_count(&statement, self.context("exists_by"))? > 0)
    }

    /// Literal select returning entities of this repository's type.
    pub fn query_list(&self, query: &LiteralQuery, params: &Params) -> RepoResult<Vec<E>> {
        self.run_list(&query.compile()?, params)
    }

    /// Literal select returning at most one entity.
    pub fn query_one(&self, query: &LiteralQuery, params: &Params) -> RepoResult<Option<E>> {
        self.run_one(&query.compile()?, params)
    }

    /// First column of the first row, `None` when no row matched.
    pub fn query_scalar(
        &self,
        query: &LiteralQuery,
        params: &Params,
    ) -> RepoResult<Option<QueryValue>> {
        self.run_scalar(&query.compile()?, params)
    }

    /// Untyped rows of any select, typically native SQL.
    pub fn query_rows(&self, query: &LiteralQuery, params: &Params) -> RepoResult<Vec<ValueRow>> {
        self.run_rows(&query.compile()?, params)
    }

    /// Integer result of a counting select (`select count(id) from …`).
    pub fn count_native(&self, query: &LiteralQuery, params: &Params) -> RepoResult<i64> {
        self.run_count(&query.compile()?, params)
    }

    /// Literal `update`/`delete`; returns the number of affected rows.
    ///
    /// # Errors
    /// - `ReadOnlyTransaction` outside a read-write scope; nothing executes.
    /// - `MalformedQuery` when `query` is a select.
    pub fn execute_modifying(&self, query: &LiteralQuery, params: &Params) -> RepoResult<usize> {
        self.run_modifying(&query.compile()?, params)
    }

    pub(crate) fn run_list(&self, compiled: &CompiledQuery, params: &Params) -> RepoResult<Vec<E>> {
        let context = self.context("query_list");
        require_select(compiled)?;
        match compiled.shape {
            ResultShape::Entity(schema) if schema == E::schema() => {}
            _ => {
                return Err(QueryError::MalformedQuery {
                    query: compiled.source.clone(),
                    message: format!("query does not select {} rows", E::schema().name),
                }
                .into())
            }
        }
        let statement = Statement {
            sql: compiled.sql.clone(),
            params: compiled.bind(params)?,
        };
        self.fetch(&statement, context)
    }

    pub(crate) fn run_one(&self, compiled: &CompiledQuery, params: &Params) -> RepoResult<Option<E>> {
        let found = self.run_list(compiled, params)?;
        at_most_one(found, E::schema().name)
    }

    pub(crate) fn run_scalar(
        &self,
        compiled: &CompiledQuery,
        params: &Params,
    ) -> RepoResult<Option<QueryValue>> {
        let rows = self.run_rows(compiled, params)?;
        Ok(rows.into_iter().next().and_then(|row| row.into_iter().next()))
    }

    pub(crate) fn run_rows(
        &self,
        compiled: &CompiledQuery,
        params: &Params,
    ) -> RepoResult<Vec<ValueRow>> {
        let context = self.context("query_rows");
        require_select(compiled)?;
        let values = compiled.bind(params)?;
        let started_at = Instant::now();

        let mut stmt = self.conn.prepare(&compiled.sql).in_context(context)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(values)).in_context(context)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().in_context(context)? {
            out.push(value_row(row, width).in_context(context)?);
        }
        log_query(context, out.len(), started_at);
        Ok(out)
    }

    pub(crate) fn run_count(&self, compiled: &CompiledQuery, params: &Params) -> RepoResult<i64> {
        match self.run_scalar(compiled, params)? {
            None => Ok(0),
            Some(value) => value.as_i64().ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "count query `{}` returned non-integer value {value}",
                    compiled.source
                ))
            }),
        }
    }

    pub(crate) fn run_modifying(&self, compiled: &CompiledQuery, params: &Params) -> RepoResult<usize> {
        let context = self.context("execute_modifying");
        if !compiled.is_modifying() {
            return Err(QueryError::MalformedQuery {
                query: compiled.source.clone(),
                message: "expected an update or delete statement".to_string(),
            }
            .into());
        }
        if self.mode != Some(TxMode::ReadWrite) {
            return Err(RepoError::ReadOnlyTransaction(context));
        }
        let values = compiled.bind(params)?;
        let started_at = Instant::now();
        let changed = self
            .conn
            .execute(&compiled.sql, params_from_iter(values))
            .in_context(context)?;
        debug!(
            "event=query module=repo status=ok entity={} operation={} rows={} duration_ms={}",
            context.entity,
            context.operation,
            changed,
            started_at.elapsed().as_millis()
        );
        Ok(changed)
    }

    fn context(&self, operation: &'static str) -> ErrorContext {
        ErrorContext::new(E::schema().name, operation)
    }

    fn ensure_writable(&self, context: ErrorContext) -> RepoResult<()> {
        if self.mode == Some(TxMode::ReadOnly) {
            return Err(RepoError::ReadOnlyTransaction(context));
        }
        Ok(())
    }

    fn derived_predicate(
        &self,
        method: &str,
        expected: Subject,
        args: Vec<QueryValue>,
    ) -> RepoResult<Predicate> {
        let query = resolve_cached(method, E::schema())?;
        if query.subject != expected {
            return Err(QueryError::InvalidMethodName {
                method: method.to_string(),
                reason: format!("expected a {expected:?} query, got {:?}", query.subject),
            }
            .into());
        }
        Ok(query.bind(args)?)
    }

    fn id_predicate(&self, id: EntityId) -> RepoResult<Predicate> {
        let root = Root::<E>::new();
        Ok(root.get(E::schema().id_attribute)?.eq(id))
    }

    fn page_where(
        &self,
        filter: Option<&Predicate>,
        request: &PageRequest,
        context: ErrorContext,
    ) -> RepoResult<Page<E>> {
        let order = request.sort().resolve(E::schema())?;
        let total = self.fetch_count(&count_statement(E::schema(), filter), context)?;
        let content = if request.offset() >= total {
            Vec::new()
        } else {
            let window = Window {
                limit: request.size(),
                offset: request.offset(),
            };
            self.fetch(
                &select_statement(E::schema(), filter, &order, Some(window)),
                context,
            )?
        };
        Ok(Page::new(content, request, total))
    }

    fn fetch(&self, statement: &Statement, context: ErrorContext) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let mut stmt = self.conn.prepare(&statement.sql).in_context(context)?;
        let mut rows = stmt
            .query(params_from_iter(statement.params.iter()))
            .in_context(context)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().in_context(context)? {
            out.push(E::from_row(row)?);
        }
        log_query(context, out.len(), started_at);
        Ok(out)
    }

    fn fetch_count(&self, statement: &Statement, context: ErrorContext) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row(
                &statement.sql,
                params_from_iter(statement.params.iter()),
                |row| row.get(0),
            )
            .in_context(context)?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
    }

    fn write(&self, entity: &mut E, context: ErrorContext) -> RepoResult<()> {
        let schema = E::schema();
        let values: Vec<Value> = entity
            .data_values()
            .iter()
            .flat_map(QueryValue::sql_values)
            .collect();
        match entity.id() {
            None => {
                self.conn
                    .execute(&insert_sql(schema), params_from_iter(values))
                    .in_context(context)?;
                entity.assign_id(self.conn.last_insert_rowid());
            }
            Some(id) => {
                let mut bound = Vec::with_capacity(values.len() + 1);
                bound.push(Value::Integer(id));
                bound.extend(values);
                self.conn
                    .execute(&upsert_sql(schema), params_from_iter(bound))
                    .in_context(context)?;
            }
        }
        Ok(())
    }
}

impl<E: Entity> CrudRepository<E> for SqliteRepository<'_, E> {
    fn save(&self, mut entity: E) -> RepoResult<E> {
        let context = self.context("save");
        self.ensure_writable(context)?;
        entity.validate()?;
        with_savepoint(self.conn, context, || self.write(&mut entity, context))?;
        Ok(entity)
    }

    fn save_all(&self, mut entities: Vec<E>) -> RepoResult<Vec<E>> {
        let context = self.context("save_all");
        if self.mode != Some(TxMode::ReadWrite) {
            return Err(RepoError::ReadOnlyTransaction(context));
        }
        for entity in &entities {
            entity.validate()?;
        }
        with_savepoint(self.conn, context, || {
            for entity in entities.iter_mut() {
                self.write(entity, context)?;
            }
            Ok(())
        })?;
        Ok(entities)
    }

    fn find_by_id(&self, id: EntityId) -> RepoResult<Option<E>> {
        let predicate = self.id_predicate(id)?;
        let statement = select_statement(E::schema(), Some(&predicate), &[], None);
        let found = self.fetch(&statement, self.context("find_by_id"))?;
        Ok(found.into_iter().next())
    }

    fn exists_by_id(&self, id: EntityId) -> RepoResult<bool> {
        let predicate = self.id_predicate(id)?;
        let statement = count_statement(E::schema(), Some(&predicate));
        Ok(self.fetch_count(&statement, self.context("exists_by_id"))? > 0)
    }

    fn find_all_by_id(&self, ids: &[EntityId]) -> RepoResult<Vec<E>> {
        let root = Root::<E>::new();
        let predicate = root.get(E::schema().id_attribute)?.is_in(ids.iter().copied());
        let order = Sort::by([Order::asc(E::schema().id_attribute)])
            .resolve(E::schema())?;
        let statement = select_statement(E::schema(), Some(&predicate), &order, None);
        self.fetch(&statement, self.context("find_all_by_id"))
    }

    fn find_all(&self) -> RepoResult<Vec<E>> {
        let statement = select_statement(E::schema(), None, &[], None);
        self.fetch(&statement, self.context("find_all"))
    }

    fn count(&self) -> RepoResult<u64> {
        self.fetch_count(&count_statement(E::schema(), None), self.context("count"))
    }

    fn delete_by_id(&self, id: EntityId) -> RepoResult<()> {
        let context = self.context("delete_by_id");
        self.ensure_writable(context)?;
        let changed = with_savepoint(self.conn, context, || {
            self.conn
                .execute(&delete_by_id_sql(E::schema()), [id])
                .in_context(context)
        })?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: E::schema().name,
                id,
            });
        }
        Ok(())
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        let context = self.context("delete");
        self.ensure_writable(context)?;
        let Some(id) = entity.id() else {
            return Ok(());
        };
        with_savepoint(self.conn, context, || {
            self.conn
                .execute(&delete_by_id_sql(E::schema()), [id])
                .in_context(context)
        })?;
        Ok(())
    }
}

fn require_select(compiled: &CompiledQuery) -> RepoResult<()> {
    if compiled.kind != StatementKind::Select {
        return Err(QueryError::MalformedQuery {
            query: compiled.source.clone(),
            message: "expected a select statement; use execute_modifying".to_string(),
        }
        .into());
    }
    Ok(())
}

pub(crate) fn at_most_one<E>(found: Vec<E>, entity: &str) -> RepoResult<Option<E>> {
    if found.len() > 1 {
        return Err(RepoError::InvalidData(format!(
            "expected at most one {entity}, query returned {}",
            found.len()
        )));
    }
    Ok(found.into_iter().next())
}

fn value_row(row: &Row<'_>, width: usize) -> rusqlite::Result<ValueRow> {
    (0..width)
        .map(|index| row.get::<_, Value>(index).map(QueryValue::from_sql_value))
        .collect()
}

fn log_query(context: ErrorContext, rows: usize, started_at: Instant) {
    debug!(
        "event=query module=repo status=ok entity={} operation={} rows={} duration_ms={}",
        context.entity,
        context.operation,
        rows,
        started_at.elapsed().as_millis()
    );
}

#[cfg(test)]
mod tests {
    use super::{CrudRepository, SqliteRepository};
    use crate::db::open_db_in_memory;
    use crate::model::dog::Dog;
    use crate::query::literal::{LiteralQuery, Params};
    use crate::query::QueryError;
    use crate::repo::tx::{TxMode, TxScope};
    use crate::repo::RepoError;

    #[test]
    fn save_assigns_identity_then_upserts() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRepository::<Dog>::new(&conn);

        let saved = repo.save(Dog::new("阿黄", 3)).unwrap();
        let id = saved.id.unwrap();

        let mut renamed = saved.clone();
        renamed.name = "大黄".to_string();
        repo.save(renamed).unwrap();

        let loaded = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.name, "大黄");
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn save_with_unknown_identity_inserts_that_identity() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRepository::<Dog>::new(&conn);
        let mut dog = Dog::new("rex", 1);
        dog.id = Some(42);
        repo.save(dog).unwrap();
        assert!(repo.exists_by_id(42).unwrap());
    }

    #[test]
    fn invalid_entity_writes_nothing() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRepository::<Dog>::new(&conn);
        let err = repo.save(Dog::new("  ", 1)).unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn save_all_needs_read_write_scope() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRepository::<Dog>::new(&conn);
        let err = repo.save_all(vec![Dog::new("a", 1)]).unwrap_err();
        assert!(matches!(err, RepoError::ReadOnlyTransaction(_)));
    }

    #[test]
    fn modifying_query_in_read_only_scope_executes_nothing() {
        let mut conn = open_db_in_memory().unwrap();
        let id = SqliteRepository::<Dog>::new(&conn)
            .save(Dog::new("a", 1))
            .unwrap()
            .id
            .unwrap();

        let scope = TxScope::begin(&mut conn, TxMode::ReadOnly).unwrap();
        let repo = SqliteRepository::<Dog>::in_scope(&scope);
        let err = repo
            .execute_modifying(
                &LiteralQuery::entity("update Dog d set d.age = :age where d.id = :id"),
                &Params::named([("age", 9), ("id", id)]),
            )
            .unwrap_err();
        assert!(matches!(err, RepoError::ReadOnlyTransaction(_)));
        assert_eq!(repo.find_by_id(id).unwrap().unwrap().age, Some(1));
        drop(repo);
        scope.commit().unwrap();
    }

    #[test]
    fn query_list_rejects_foreign_entity_rows() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRepository::<Dog>::new(&conn);
        let err = repo
            .query_list(&LiteralQuery::entity("select a from Address a"), &Params::none())
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Query(QueryError::MalformedQuery { .. })
        ));
    }

    #[test]
    fn delete_by_missing_id_is_not_found() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRepository::<Dog>::new(&conn);
        let err = repo.delete_by_id(7).unwrap_err();
        assert!(matches!(err, RepoError::NotFound { entity: "Dog", id: 7 }));
    }

    #[test]
    fn derived_subject_must_match_entry_point() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRepository::<Dog>::new(&conn);
        let err = repo.find_by("countByName", vec!["a".into()]).unwrap_err();
        assert!(matches!(
            err,
            RepoError::Query(QueryError::InvalidMethodName { .. })
        ));
    }
}
