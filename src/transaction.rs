use log::debug;

use crate::bucket::Bucket;
use crate::engine::EngineTxn;
use crate::error::{Error, Result, ResultExt};
use crate::key::{registry_key, registry_prefix, to_prefix, validate_bucket_name};
use crate::types::BucketName;

/// Transaction handed to `Database::view` and `Database::update` callbacks.
///
/// Every bucket obtained from it shares the same engine transaction and
/// snapshot. Buckets are tracked in a registry so existence does not depend
/// on whether a bucket currently holds keys.
pub struct Transaction<'t> {
    txn: &'t dyn EngineTxn,
}

impl<'t> Transaction<'t> {
    pub fn new(txn: &'t dyn EngineTxn) -> Self {
        Transaction { txn }
    }

    pub fn is_writable(&self) -> bool {
        self.txn.is_writable()
    }

    /// Existing bucket, `NotFound` if it was never created
    pub fn bucket(&self, name: impl Into<BucketName>) -> Result<Bucket<'t>> {
        let name = name.into();
        validate_bucket_name(&name)?;
        if !self.exists(&name)? {
            return Err(Error::NotFound(name));
        }
        Ok(Bucket::new(self.txn, name))
    }

    /// New bucket, `AlreadyExists` if it is registered
    pub fn create_bucket(&self, name: impl Into<BucketName>) -> Result<Bucket<'t>> {
        let name = name.into();
        validate_bucket_name(&name)?;
        if self.exists(&name)? {
            return Err(Error::AlreadyExists(name));
        }
        self.register(name)
    }

    pub fn create_bucket_if_not_exists(&self, name: impl Into<BucketName>) -> Result<Bucket<'t>> {
        let name = name.into();
        validate_bucket_name(&name)?;
        if self.exists(&name)? {
            return Ok(Bucket::new(self.txn, name));
        }
        self.register(name)
    }

    /// Delete the bucket and every key stored in it
    pub fn delete_bucket(&self, name: impl Into<BucketName>) -> Result<()> {
        let name = name.into();
        validate_bucket_name(&name)?;
        if !self.exists(&name)? {
            return Err(Error::NotFound(name));
        }

        let prefix = to_prefix(&name);
        let mut cursor = self.txn.cursor(false);
        let mut deleted = 0usize;
        cursor.seek(&prefix);
        while cursor.valid_for_prefix(&prefix) {
            let Some(key) = cursor.key().map(<[u8]>::to_vec) else {
                break;
            };
            self.txn
                .delete(&key)
                .with_context(|| format!("delete bucket {} failed", name))?;
            deleted += 1;
            cursor.next();
        }
        drop(cursor);

        self.txn
            .delete(&registry_key(&name))
            .with_context(|| format!("delete bucket {} failed", name))?;
        debug!("delete all {} keys of bucket {} completed", deleted, name);
        Ok(())
    }

    /// Names of all registered buckets in byte order
    pub fn list_bucket_names(&self) -> Result<Vec<BucketName>> {
        let prefix = registry_prefix();
        let mut cursor = self.txn.cursor(false);
        let mut names = Vec::new();
        cursor.seek(&prefix);
        while cursor.valid_for_prefix(&prefix) {
            if let Some(key) = cursor.key() {
                names.push(BucketName::from(&key[prefix.len()..]));
            }
            cursor.next();
        }
        Ok(names)
    }

    fn exists(&self, name: &BucketName) -> Result<bool> {
        let found = self
            .txn
            .get(&registry_key(name))
            .with_context(|| format!("lookup bucket {} failed", name))?;
        Ok(found.is_some())
    }

    fn register(&self, name: BucketName) -> Result<Bucket<'t>> {
        self.txn
            .set(&registry_key(&name), &[])
            .with_context(|| format!("create bucket {} failed", name))?;
        debug!("bucket {} created", name);
        Ok(Bucket::new(self.txn, name))
    }
}
