//! Storage engine contract.
//!
//! The bucket layer only ever talks to an ordered, transactional byte-key
//! store through these traits. `Environment` is the bundled implementation;
//! any other engine providing snapshot reads, atomic commit and ordered
//! cursors can be plugged into `Database::new`.

use crate::error::Result;

/// Ordered transactional byte-key store
pub trait Engine: Send + Sync {
    /// Begin a transaction. Read-only transactions see the state committed at
    /// begin time; write transactions additionally see their own writes.
    fn begin_txn(&self, writable: bool) -> Result<Box<dyn EngineTxn + '_>>;

    /// Flush committed data to durable storage
    fn sync(&self) -> Result<()>;

    /// Release the engine. Transactions begun afterwards must fail.
    fn close(&self) -> Result<()>;
}

/// One engine transaction.
///
/// All methods take `&self` so several bucket handles can share the
/// transaction; implementations buffer writes internally. Dropping an
/// uncommitted transaction rolls it back.
pub trait EngineTxn {
    fn is_writable(&self) -> bool;

    /// Value stored under `key`, `None` if absent
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete `key`; deleting an absent key succeeds
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// New cursor, unpositioned until `rewind` or `seek`
    fn cursor(&self, reverse: bool) -> Box<dyn EngineCursor + '_>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>);
}

/// Ordered cursor over an engine transaction
pub trait EngineCursor {
    /// Position at the first key (last key when reverse)
    fn rewind(&mut self);

    /// Forward: first key >= `key`. Reverse: last key <= `key`.
    fn seek(&mut self, key: &[u8]);

    /// Advance one step in the cursor's direction
    fn next(&mut self);

    fn valid(&self) -> bool;

    fn valid_for_prefix(&self, prefix: &[u8]) -> bool {
        self.key().is_some_and(|key| key.starts_with(prefix))
    }

    /// Current key, `None` when not valid
    fn key(&self) -> Option<&[u8]>;

    /// Current value, `None` when not valid
    fn value(&self) -> Option<&[u8]>;
}
