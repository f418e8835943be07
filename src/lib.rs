//! Transactional key-value storage with named buckets.
//!
//! Buckets partition one flat, ordered engine key space by prefix
//! (`bucket ++ '_' ++ key`). A [`Database`] runs read-only ([`Database::view`])
//! and read-write ([`Database::update`]) transactions over any [`Engine`] and
//! refuses to open a second transaction on a [`Context`] that already carries
//! one. [`RelationStore`] builds a bidirectional 1:N index on top.

mod bucket;
mod constants;
mod context;
mod cursor;
mod database;
mod engine;
mod env;
mod error;
mod item;
mod iterator;
pub mod key;
mod meta;
mod relation;
mod transaction;
mod types;

pub use bucket::Bucket;
pub use constants::{EnvFlags, BUCKET_DELIMITER, DATA_FILE_NAME, DEFAULT_MAX_READERS};
pub use context::{CancelToken, Context};
pub use cursor::EnvCursor;
pub use database::Database;
pub use engine::{Engine, EngineCursor, EngineTxn};
pub use env::{EnvTxn, Environment};
pub use error::{Error, Result, ResultExt};
pub use item::Item;
pub use iterator::BucketIterator;
pub use relation::{RelationKey, RelationStore, RelationStoreString, RelationStoreTx, Sink};
pub use transaction::Transaction;
pub use types::{BucketName, Stat};
