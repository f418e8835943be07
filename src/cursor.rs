use std::ops::Bound;

use crate::engine::EngineCursor;
use crate::env::EnvTxn;

/// Ordered cursor over an environment transaction.
///
/// The cursor keeps a copy of the entry it is positioned on and looks up its
/// neighbor on every step, so the owning transaction may write, including
/// deleting the current key, while the cursor is live.
pub struct EnvCursor<'txn, 'env> {
    /// The transaction this cursor belongs to
    txn: &'txn EnvTxn<'env>,
    /// Walk from largest to smallest key
    reverse: bool,
    /// Current entry, `None` when exhausted or unpositioned
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl<'txn, 'env> EnvCursor<'txn, 'env> {
    pub(crate) fn new(txn: &'txn EnvTxn<'env>, reverse: bool) -> Self {
        EnvCursor {
            txn,
            reverse,
            current: None,
        }
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }
}

impl EngineCursor for EnvCursor<'_, '_> {
    fn rewind(&mut self) {
        self.current = self.txn.neighbor(Bound::Unbounded, self.reverse);
    }

    fn seek(&mut self, key: &[u8]) {
        self.current = self.txn.neighbor(Bound::Included(key), self.reverse);
    }

    fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self.txn.neighbor(Bound::Excluded(key.as_slice()), self.reverse);
        }
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(key, _)| key.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, value)| value.as_slice())
    }
}
