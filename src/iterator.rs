use crate::engine::EngineCursor;
use crate::item::Item;
use crate::key::{add_key, prefix_upper_bound, remove_key, to_prefix};
use crate::types::BucketName;

/// Cursor restricted to the keys of one bucket.
///
/// `valid` turns false as soon as the underlying cursor leaves the bucket's
/// prefix, so iteration never yields keys of a neighboring bucket.
pub struct BucketIterator<'t> {
    /// Engine cursor
    cursor: Box<dyn EngineCursor + 't>,
    /// Bucket being iterated
    bucket: BucketName,
    /// `bucket ++ '_'`
    prefix: Vec<u8>,
    /// Walk from largest to smallest key
    reverse: bool,
}

impl<'t> BucketIterator<'t> {
    pub(crate) fn new(cursor: Box<dyn EngineCursor + 't>, bucket: BucketName, reverse: bool) -> Self {
        let prefix = to_prefix(&bucket);
        BucketIterator {
            cursor,
            bucket,
            prefix,
            reverse,
        }
    }

    /// Position at the first key of the bucket, the last key when reverse
    pub fn rewind(&mut self) {
        if !self.reverse {
            self.cursor.seek(&self.prefix);
            return;
        }

        // Reverse seek lands on the last key <= target, so aim just past the
        // bucket's range and step back off the bound itself if it exists.
        match prefix_upper_bound(&self.prefix) {
            Some(upper) => {
                self.cursor.seek(&upper);
                if self.cursor.key() == Some(upper.as_slice()) {
                    self.cursor.next();
                }
            }
            None => self.cursor.rewind(),
        }
    }

    /// Forward: first key >= `key`. Reverse: last key <= `key`.
    pub fn seek(&mut self, key: &[u8]) {
        self.cursor.seek(&add_key(&self.bucket, key));
    }

    pub fn valid(&self) -> bool {
        self.cursor.valid_for_prefix(&self.prefix)
    }

    pub fn next(&mut self) {
        self.cursor.next();
    }

    /// Entry at the current position, `None` when not valid
    pub fn item(&self) -> Option<Item<'_>> {
        if !self.valid() {
            return None;
        }
        let key = self.cursor.key()?;
        let value = self.cursor.value()?;
        Some(Item::borrowed(remove_key(&self.bucket, key), value))
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    /// Release the underlying cursor
    pub fn close(self) {}
}
