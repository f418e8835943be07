//! Bidirectional 1:N relation index.
//!
//! Two buckets hold the relation: `{name}-id-related` maps an id to the set of
//! its related ids and `{name}-related-id` maps a related id back to the set
//! of ids referencing it. Sets are stored as sorted JSON arrays and an entry
//! is removed once its set is empty. Every mutation updates both sides inside
//! one write transaction, so the two indices are always mirror images.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;

use log::trace;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bucket::Bucket;
use crate::context::Context;
use crate::database::Database;
use crate::error::{Error, Result, ResultExt};
use crate::transaction::Transaction;
use crate::types::BucketName;

/// Identifier usable on either side of a relation
pub trait RelationKey: Clone + Ord + Serialize + DeserializeOwned {
    /// Bytes used as the bucket key
    fn to_key(&self) -> Vec<u8>;

    /// Rebuild the identifier from a bucket key
    fn from_key(key: &[u8]) -> Result<Self>;
}

impl RelationKey for String {
    fn to_key(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_key(key: &[u8]) -> Result<Self> {
        String::from_utf8(key.to_vec()).map_err(Error::other)
    }
}

impl RelationKey for Vec<u8> {
    fn to_key(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_key(key: &[u8]) -> Result<Self> {
        Ok(key.to_vec())
    }
}

/// Destination for streamed identifiers
pub trait Sink<T> {
    fn send(&self, value: T) -> Result<()>;
}

impl<T> Sink<T> for Sender<T> {
    fn send(&self, value: T) -> Result<()> {
        Sender::send(self, value).map_err(|_| Error::ChannelClosed)
    }
}

impl<T> Sink<T> for SyncSender<T> {
    fn send(&self, value: T) -> Result<()> {
        SyncSender::send(self, value).map_err(|_| Error::ChannelClosed)
    }
}

/// Relation operations inside a caller-owned transaction
#[derive(Debug, Clone)]
pub struct RelationStoreTx<ID, RelatedID> {
    /// id -> related ids
    forward: BucketName,
    /// related id -> ids
    backward: BucketName,
    _marker: PhantomData<fn() -> (ID, RelatedID)>,
}

impl<ID: RelationKey, RelatedID: RelationKey> RelationStoreTx<ID, RelatedID> {
    pub fn new(name: &str) -> Self {
        RelationStoreTx {
            forward: BucketName::from(format!("{}-id-related", name)),
            backward: BucketName::from(format!("{}-related-id", name)),
            _marker: PhantomData,
        }
    }

    /// Add `related_ids` to the relations of `id`
    pub fn add(&self, tx: &Transaction<'_>, id: &ID, related_ids: &[RelatedID]) -> Result<()> {
        let (forward, backward) = self.write_buckets(tx)?;
        let id_key = id.to_key();

        let mut related: BTreeSet<RelatedID> = read_set(&forward, &id_key)?;
        for related_id in related_ids {
            if !related.insert(related_id.clone()) {
                continue;
            }
            let related_key = related_id.to_key();
            let mut ids: BTreeSet<ID> = read_set(&backward, &related_key)?;
            ids.insert(id.clone());
            write_set(&backward, &related_key, &ids)?;
        }
        write_set(&forward, &id_key, &related).context("add relation failed")
    }

    /// Make `related_ids` the exact relation set of `id`
    pub fn replace(&self, tx: &Transaction<'_>, id: &ID, related_ids: &[RelatedID]) -> Result<()> {
        let (forward, backward) = self.write_buckets(tx)?;
        let id_key = id.to_key();

        let current: BTreeSet<RelatedID> = read_set(&forward, &id_key)?;
        let wanted: BTreeSet<RelatedID> = related_ids.iter().cloned().collect();

        for gone in current.difference(&wanted) {
            let related_key = gone.to_key();
            let mut ids: BTreeSet<ID> = read_set(&backward, &related_key)?;
            ids.remove(id);
            write_set(&backward, &related_key, &ids)?;
        }
        for added in wanted.difference(&current) {
            let related_key = added.to_key();
            let mut ids: BTreeSet<ID> = read_set(&backward, &related_key)?;
            ids.insert(id.clone());
            write_set(&backward, &related_key, &ids)?;
        }
        if current != wanted {
            write_set(&forward, &id_key, &wanted).context("replace relation failed")?;
        }
        Ok(())
    }

    /// Drop the relations between `id` and each of `related_ids`
    pub fn remove(&self, tx: &Transaction<'_>, id: &ID, related_ids: &[RelatedID]) -> Result<()> {
        let (forward, backward) = self.write_buckets(tx)?;
        let id_key = id.to_key();

        let mut related: BTreeSet<RelatedID> = read_set(&forward, &id_key)?;
        for related_id in related_ids {
            if !related.remove(related_id) {
                continue;
            }
            let related_key = related_id.to_key();
            let mut ids: BTreeSet<ID> = read_set(&backward, &related_key)?;
            ids.remove(id);
            write_set(&backward, &related_key, &ids)?;
        }
        write_set(&forward, &id_key, &related).context("remove relation failed")
    }

    /// Drop `id` and all of its relations
    pub fn delete(&self, tx: &Transaction<'_>, id: &ID) -> Result<()> {
        let (forward, backward) = self.write_buckets(tx)?;
        let id_key = id.to_key();

        let related: BTreeSet<RelatedID> = read_set(&forward, &id_key)?;
        for related_id in &related {
            let related_key = related_id.to_key();
            let mut ids: BTreeSet<ID> = read_set(&backward, &related_key)?;
            ids.remove(id);
            write_set(&backward, &related_key, &ids)?;
        }
        trace!("relation {} deleted with {} links", self.forward, related.len());
        forward.delete(&id_key).context("delete relation failed")
    }

    /// Related ids of `id`, empty if it has none
    pub fn related_ids(&self, tx: &Transaction<'_>, id: &ID) -> Result<Vec<RelatedID>> {
        let Some(forward) = read_bucket(tx, &self.forward)? else {
            return Ok(Vec::new());
        };
        let related: BTreeSet<RelatedID> = read_set(&forward, &id.to_key())?;
        Ok(related.into_iter().collect())
    }

    /// Ids related to `related_id`, empty if there are none
    pub fn ids(&self, tx: &Transaction<'_>, related_id: &RelatedID) -> Result<Vec<ID>> {
        let Some(backward) = read_bucket(tx, &self.backward)? else {
            return Ok(Vec::new());
        };
        let ids: BTreeSet<ID> = read_set(&backward, &related_id.to_key())?;
        Ok(ids.into_iter().collect())
    }

    /// Send every id that has at least one relation, in key order
    pub fn stream_ids(&self, tx: &Transaction<'_>, sink: &dyn Sink<ID>) -> Result<()> {
        stream_keys(tx, &self.forward, sink)
    }

    /// Send every related id that has at least one relation, in key order
    pub fn stream_related_ids(&self, tx: &Transaction<'_>, sink: &dyn Sink<RelatedID>) -> Result<()> {
        stream_keys(tx, &self.backward, sink)
    }

    fn write_buckets<'t>(&self, tx: &Transaction<'t>) -> Result<(Bucket<'t>, Bucket<'t>)> {
        let forward = tx.create_bucket_if_not_exists(&self.forward)?;
        let backward = tx.create_bucket_if_not_exists(&self.backward)?;
        Ok((forward, backward))
    }
}

/// Relation store running each operation in its own transaction
#[derive(Clone)]
pub struct RelationStore<ID, RelatedID> {
    relation_store_tx: RelationStoreTx<ID, RelatedID>,
    db: Arc<Database>,
}

/// Relation store over string identifiers
pub type RelationStoreString = RelationStore<String, String>;

impl<ID: RelationKey, RelatedID: RelationKey> RelationStore<ID, RelatedID> {
    pub fn new(db: Arc<Database>, name: &str) -> Self {
        RelationStore {
            relation_store_tx: RelationStoreTx::new(name),
            db,
        }
    }

    pub fn add(&self, ctx: &Context, id: &ID, related_ids: &[RelatedID]) -> Result<()> {
        self.db
            .update(ctx, |_, tx| self.relation_store_tx.add(tx, id, related_ids))
    }

    pub fn replace(&self, ctx: &Context, id: &ID, related_ids: &[RelatedID]) -> Result<()> {
        self.db
            .update(ctx, |_, tx| self.relation_store_tx.replace(tx, id, related_ids))
    }

    pub fn remove(&self, ctx: &Context, id: &ID, related_ids: &[RelatedID]) -> Result<()> {
        self.db
            .update(ctx, |_, tx| self.relation_store_tx.remove(tx, id, related_ids))
    }

    pub fn delete(&self, ctx: &Context, id: &ID) -> Result<()> {
        self.db
            .update(ctx, |_, tx| self.relation_store_tx.delete(tx, id))
    }

    pub fn related_ids(&self, ctx: &Context, id: &ID) -> Result<Vec<RelatedID>> {
        self.db
            .view(ctx, |_, tx| self.relation_store_tx.related_ids(tx, id))
    }

    pub fn ids(&self, ctx: &Context, related_id: &RelatedID) -> Result<Vec<ID>> {
        self.db
            .view(ctx, |_, tx| self.relation_store_tx.ids(tx, related_id))
    }

    pub fn stream_ids(&self, ctx: &Context, sink: &dyn Sink<ID>) -> Result<()> {
        self.db
            .view(ctx, |_, tx| self.relation_store_tx.stream_ids(tx, sink))
    }

    pub fn stream_related_ids(&self, ctx: &Context, sink: &dyn Sink<RelatedID>) -> Result<()> {
        self.db
            .view(ctx, |_, tx| self.relation_store_tx.stream_related_ids(tx, sink))
    }
}

/// Bucket for reading, `None` if it was never created
fn read_bucket<'t>(tx: &Transaction<'t>, name: &BucketName) -> Result<Option<Bucket<'t>>> {
    match tx.bucket(name) {
        Ok(bucket) => Ok(Some(bucket)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

fn read_set<K: RelationKey>(bucket: &Bucket<'_>, key: &[u8]) -> Result<BTreeSet<K>> {
    let item = bucket.get(key)?;
    item.value(|value| match value {
        Some(bytes) => serde_json::from_slice(bytes)
            .map_err(Error::from)
            .with_context(|| format!("decode relation set in {} failed", bucket.name())),
        None => Ok(BTreeSet::new()),
    })
}

fn write_set<K: RelationKey>(bucket: &Bucket<'_>, key: &[u8], set: &BTreeSet<K>) -> Result<()> {
    if set.is_empty() {
        return bucket.delete(key);
    }
    let bytes = serde_json::to_vec(set)?;
    bucket.put(key, &bytes)
}

fn stream_keys<K: RelationKey>(tx: &Transaction<'_>, name: &BucketName, sink: &dyn Sink<K>) -> Result<()> {
    let Some(bucket) = read_bucket(tx, name)? else {
        return Ok(());
    };
    let mut it = bucket.iterator();
    it.rewind();
    while let Some(item) = it.item() {
        sink.send(K::from_key(item.key())?)?;
        it.next();
    }
    it.close();
    Ok(())
}
