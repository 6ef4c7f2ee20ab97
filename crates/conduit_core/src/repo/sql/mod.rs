//! SQLite repository backend.
//!
//! # Responsibility
//! - Implement the repository contracts on one `rusqlite::Connection`.
//! - Map the atomic boundary onto a `BEGIN IMMEDIATE` transaction.
//!
//! # Invariants
//! - SQLite transactions are serializable; immediate mode takes the write
//!   lock up front so concurrent writers queue behind the busy timeout
//!   instead of deadlocking on lock upgrade. A timed-out wait surfaces as
//!   `Validation`.
//! - Nested `atomic` calls on a scoped handle reuse the open transaction.
//! - A closure error, a commit failure or a context cancelled before
//!   commit rolls the transaction back when it is dropped.
//!
//! # See also
//! - `db::migrations` for the schema these queries target.

mod article;
mod error;
mod query;
mod user;

use crate::config::{CoreConfig, IN_MEMORY_PATH};
use crate::context::Context;
use crate::db::{open_db, open_db_in_memory};
use crate::error::AppResult;
use crate::logging::OpTimer;
use crate::repo::{ArticleRepository, AtomicFn, Repository, UserRepository};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use self::article::SqlArticleRepository;
use self::user::SqlUserRepository;

/// Top-level SQLite handle. Owns its connection; one per thread.
pub struct SqlRepository {
    conn: Connection,
}

impl SqlRepository {
    /// Wraps a connection already prepared by `db::open_db*`.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens (and migrates) the database configured in `config`.
    pub fn open(config: &CoreConfig) -> AppResult<Self> {
        let conn = if config.database_path == IN_MEMORY_PATH {
            open_db_in_memory()?
        } else {
            open_db(&config.database_path, config.busy_timeout())?
        };
        Ok(Self::new(conn))
    }

    /// Fresh migrated in-memory database.
    pub fn in_memory() -> AppResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Repository for SqlRepository {
    fn atomic(&self, ctx: &Context, f: &mut AtomicFn<'_>) -> AppResult<()> {
        ctx.check()?;
        let timer = OpTimer::start("atomic", "repo.sql");
        timer.finish(run_in_transaction(&self.conn, ctx, f))
    }

    fn user(&self) -> Box<dyn UserRepository + '_> {
        Box::new(SqlUserRepository::new(&self.conn))
    }

    fn article(&self) -> Box<dyn ArticleRepository + '_> {
        Box::new(SqlArticleRepository::new(&self.conn))
    }
}

fn run_in_transaction(conn: &Connection, ctx: &Context, f: &mut AtomicFn<'_>) -> AppResult<()> {
    // `new_unchecked` lets a shared `&Connection` open the transaction.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let scope = SqlScope { conn: &tx };
    f(&scope)?;
    ctx.check()?;
    tx.commit()?;
    Ok(())
}

/// Handle bound to an open transaction.
struct SqlScope<'c> {
    conn: &'c Connection,
}

impl Repository for SqlScope<'_> {
    fn atomic(&self, ctx: &Context, f: &mut AtomicFn<'_>) -> AppResult<()> {
        ctx.check()?;
        f(self)
    }

    fn user(&self) -> Box<dyn UserRepository + '_> {
        Box::new(SqlUserRepository::new(self.conn))
    }

    fn article(&self) -> Box<dyn ArticleRepository + '_> {
        Box::new(SqlArticleRepository::new(self.conn))
    }
}
