use crate::engine::EngineTxn;
use crate::error::{Result, ResultExt};
use crate::item::Item;
use crate::iterator::BucketIterator;
use crate::key::add_key;
use crate::types::BucketName;

/// Handle on one bucket inside a transaction
pub struct Bucket<'t> {
    txn: &'t dyn EngineTxn,
    name: BucketName,
}

impl<'t> Bucket<'t> {
    pub(crate) fn new(txn: &'t dyn EngineTxn, name: BucketName) -> Self {
        Bucket { txn, name }
    }

    pub fn name(&self) -> &BucketName {
        &self.name
    }

    /// Look up `key`. An absent key yields an item whose `exists()` is false.
    pub fn get(&self, key: &[u8]) -> Result<Item<'static>> {
        let value = self
            .txn
            .get(&add_key(&self.name, key))
            .with_context(|| format!("get from bucket {} failed", self.name))?;
        Ok(Item::owned(key.to_vec(), value))
    }

    /// Insert or overwrite `key`
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.txn
            .set(&add_key(&self.name, key), value)
            .with_context(|| format!("put into bucket {} failed", self.name))
    }

    /// Remove `key`; removing an absent key succeeds
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.txn
            .delete(&add_key(&self.name, key))
            .with_context(|| format!("delete from bucket {} failed", self.name))
    }

    pub fn iterator(&self) -> BucketIterator<'t> {
        self.create_iterator(false)
    }

    pub fn iterator_reverse(&self) -> BucketIterator<'t> {
        self.create_iterator(true)
    }

    fn create_iterator(&self, reverse: bool) -> BucketIterator<'t> {
        BucketIterator::new(self.txn.cursor(reverse), self.name.clone(), reverse)
    }
}
