//! Mapping between (bucket, key) pairs and flat engine keys.
//!
//! An engine key is `bucket ++ '_' ++ key`. Bucket names never contain the
//! delimiter, so every prefix is self-terminating and two buckets can never
//! share a key range. Registry entries live under keys that start with the
//! delimiter itself, which no bucket key can do.

use crate::constants::BUCKET_DELIMITER;
use crate::error::{Error, Result};
use crate::types::BucketName;

/// Bucket name with the delimiter appended
pub fn to_prefix(bucket: &BucketName) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(bucket.len() + 1);
    prefix.extend_from_slice(bucket.as_bytes());
    prefix.push(BUCKET_DELIMITER);
    prefix
}

/// Engine key for `key` inside `bucket`
pub fn add_key(bucket: &BucketName, key: &[u8]) -> Vec<u8> {
    let mut engine_key = Vec::with_capacity(bucket.len() + 1 + key.len());
    engine_key.extend_from_slice(bucket.as_bytes());
    engine_key.push(BUCKET_DELIMITER);
    engine_key.extend_from_slice(key);
    engine_key
}

/// Strip the bucket prefix from an engine key.
///
/// The caller guarantees `engine_key` starts with the bucket's prefix.
pub fn remove_key<'a>(bucket: &BucketName, engine_key: &'a [u8]) -> &'a [u8] {
    &engine_key[bucket.len() + 1..]
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Returns `None` when no such key exists (prefix is empty or all `0xFF`).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

/// Engine key of the registry entry for `bucket`
pub(crate) fn registry_key(bucket: &BucketName) -> Vec<u8> {
    let mut key = Vec::with_capacity(bucket.len() + 1);
    key.push(BUCKET_DELIMITER);
    key.extend_from_slice(bucket.as_bytes());
    key
}

/// Prefix shared by all registry entries
pub(crate) fn registry_prefix() -> [u8; 1] {
    [BUCKET_DELIMITER]
}

pub fn validate_bucket_name(bucket: &BucketName) -> Result<()> {
    if bucket.is_empty() {
        return Err(Error::InvalidBucketName {
            name: bucket.clone(),
            reason: "name is empty",
        });
    }
    if bucket.as_bytes().contains(&BUCKET_DELIMITER) {
        return Err(Error::InvalidBucketName {
            name: bucket.clone(),
            reason: "name contains the '_' delimiter",
        });
    }
    Ok(())
}
