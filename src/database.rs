//! Transaction entry points.
//!
//! ```no_run
//! use lumokv::{Context, Database};
//!
//! # fn main() -> lumokv::Result<()> {
//! let db = Database::open_memory()?;
//! let ctx = Context::background();
//! db.update(&ctx, |_ctx, tx| {
//!     let users = tx.create_bucket_if_not_exists("users")?;
//!     users.put(b"user:1", br#"{"name":"John"}"#)
//! })?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use log::debug;

use crate::constants::EnvFlags;
use crate::context::Context;
use crate::engine::Engine;
use crate::env::Environment;
use crate::error::{Error, Result, ResultExt};
use crate::transaction::Transaction;

/// Database handle: runs read-only and read-write transactions over an
/// engine and rejects transactions nested on the same call chain.
pub struct Database {
    engine: Box<dyn Engine>,
}

impl Database {
    /// Wrap any engine
    pub fn new(engine: impl Engine + 'static) -> Self {
        Database {
            engine: Box::new(engine),
        }
    }

    /// Open a file-backed database at `path`
    pub fn open_path<P: AsRef<Path>>(path: P, flags: EnvFlags) -> Result<Self> {
        let env = Environment::new()
            .open(path.as_ref(), flags)
            .with_context(|| format!("open db at {} failed", path.as_ref().display()))?;
        Ok(Database::new(env))
    }

    /// Open a database that lives only in memory
    pub fn open_memory() -> Result<Self> {
        let env = Environment::new()
            .open_memory()
            .context("open in-memory db failed")?;
        Ok(Database::new(env))
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Run `f` in a read-only transaction.
    ///
    /// Views and updates from independent contexts may run concurrently.
    /// Every open transaction, read-only or not, takes one of the engine's
    /// reader slots; when all are taken this fails at once with
    /// `ReadersFull` rather than waiting.
    pub fn view<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Context, &Transaction<'_>) -> Result<T>,
    {
        self.run(ctx, false, f)
    }

    /// Run `f` in a read-write transaction, committed iff `f` succeeds.
    ///
    /// Write transactions are serialized: an update waits for the one in
    /// progress on another thread. Starting a second update on the thread
    /// that already runs one fails with `WriterBusy`, even from an
    /// independent context. Like `view` it needs a free reader slot.
    pub fn update<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Context, &Transaction<'_>) -> Result<T>,
    {
        self.run(ctx, true, f)
    }

    fn run<T, F>(&self, ctx: &Context, writable: bool, f: F) -> Result<T>
    where
        F: FnOnce(&Context, &Transaction<'_>) -> Result<T>,
    {
        let op = if writable { "update" } else { "view" };
        debug!("db {} started", op);

        if ctx.is_transaction_open() {
            return Err(Error::TransactionAlreadyOpen.context(format!("db {} failed", op)));
        }
        if let Some(err) = ctx.err() {
            return Err(err.context(format!("db {} failed", op)));
        }

        let txn = self
            .engine
            .begin_txn(writable)
            .with_context(|| format!("db {} failed", op))?;
        let ctx = ctx.with_open_transaction();

        let result = f(&ctx, &Transaction::new(txn.as_ref()));
        let value = match result {
            Ok(value) => value,
            Err(err) => {
                txn.rollback();
                return Err(err.context(format!("db {} failed", op)));
            }
        };

        if writable {
            txn.commit().context("db update commit failed")?;
        } else {
            txn.rollback();
        }
        debug!("db {} completed", op);
        Ok(value)
    }

    /// Flush committed data to durable storage
    pub fn sync(&self) -> Result<()> {
        self.engine.sync()
    }

    /// Release the engine; later transactions fail
    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }
}
