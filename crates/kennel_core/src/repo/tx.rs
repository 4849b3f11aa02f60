//! Transaction scopes and savepoints.
//!
//! # Responsibility
//! - Open one SQLite transaction per [`TxScope`] with an explicit
//!   read-only/read-write mode.
//! - Provide nested all-or-nothing units through named savepoints.
//!
//! # Invariants
//! - A scope ends exactly once: `commit`, `rollback`, or drop (rollback).
//! - Read-write scopes start `IMMEDIATE` so the write lock is taken up front.
//! - Savepoint names are generated per call and never reused concurrently.

use crate::repo::{classify, ErrorContext, RepoResult};
use log::{debug, error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use uuid::Uuid;

static SAVEPOINT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

impl TxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::ReadWrite => "read_write",
        }
    }

    fn behavior(self) -> TransactionBehavior {
        match self {
            Self::ReadOnly => TransactionBehavior::Deferred,
            Self::ReadWrite => TransactionBehavior::Immediate,
        }
    }
}

impl Display for TxMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active transaction over a mutably borrowed connection.
///
/// Dropping an uncommitted scope rolls it back.
pub struct TxScope<'conn> {
    tx: Transaction<'conn>,
    mode: TxMode,
    id: Uuid,
    started_at: Instant,
}

impl<'conn> TxScope<'conn> {
    /// Begins a transaction in `mode`.
    ///
    /// # Errors
    /// - `Connection` when the write lock cannot be acquired within the
    ///   configured busy timeout.
    pub fn begin(conn: &'conn mut Connection, mode: TxMode) -> RepoResult<Self> {
        let id = Uuid::new_v4();
        let tx = conn
            .transaction_with_behavior(mode.behavior())
            .map_err(|err| {
                error!(
                    "event=tx_begin module=repo status=error tx_id={} mode={} error={}",
                    id, mode, err
                );
                classify(err, ErrorContext::new("tx", "begin"))
            })?;
        info!(
            "event=tx_begin module=repo status=ok tx_id={} mode={}",
            id, mode
        );
        Ok(Self {
            tx,
            mode,
            id,
            started_at: Instant::now(),
        })
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    pub fn commit(self) -> RepoResult<()> {
        let Self {
            tx,
            mode,
            id,
            started_at,
        } = self;
        match tx.commit() {
            Ok(()) => {
                info!(
                    "event=tx_commit module=repo status=ok tx_id={} mode={} duration_ms={}",
                    id,
                    mode,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tx_commit module=repo status=error tx_id={} mode={} duration_ms={} error={}",
                    id,
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(classify(err, ErrorContext::new("tx", "commit")))
            }
        }
    }

    pub fn rollback(self) -> RepoResult<()> {
        let Self {
            tx,
            mode,
            id,
            started_at,
        } = self;
        let result = tx.rollback();
        info!(
            "event=tx_rollback module=repo status={} tx_id={} mode={} duration_ms={}",
            if result.is_ok() { "ok" } else { "error" },
            id,
            mode,
            started_at.elapsed().as_millis()
        );
        result.map_err(|err| classify(err, ErrorContext::new("tx", "rollback")))
    }
}

/// Runs `f` inside a savepoint: released on `Ok`, rolled back on `Err`.
///
/// Works both inside an open transaction and in autocommit mode, where the
/// savepoint acts as its own transaction.
pub fn with_savepoint<T>(
    conn: &Connection,
    context: ErrorContext,
    f: impl FnOnce() -> RepoResult<T>,
) -> RepoResult<T> {
    let name = format!("sp_{}", SAVEPOINT_SEQ.fetch_add(1, Ordering::Relaxed));
    conn.execute_batch(&format!("SAVEPOINT {name};"))
        .map_err(|err| classify(err, context))?;

    match f() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name};"))
                .map_err(|err| classify(err, context))?;
            Ok(value)
        }
        Err(err) => {
            debug!(
                "event=savepoint_rollback module=repo status=ok entity={} operation={}",
                context.entity, context.operation
            );
            if let Err(rollback_err) =
                conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
            {
                error!(
                    "event=savepoint_rollback module=repo status=error entity={} operation={} error={}",
                    context.entity, context.operation, rollback_err
                );
            }
            Err(err)
        }
    }
}
