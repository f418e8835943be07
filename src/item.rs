use std::borrow::Cow;

use crate::error::Result;

/// One key observed within a transaction.
///
/// Items from iteration borrow the cursor's current entry and are only valid
/// until the cursor moves. Items from `Bucket::get` own their bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item<'a> {
    /// Key with the bucket prefix stripped
    key: Cow<'a, [u8]>,
    /// Stored value, `None` when the key is absent
    value: Option<Cow<'a, [u8]>>,
}

impl<'a> Item<'a> {
    pub(crate) fn borrowed(key: &'a [u8], value: &'a [u8]) -> Self {
        Item {
            key: Cow::Borrowed(key),
            value: Some(Cow::Borrowed(value)),
        }
    }

    pub(crate) fn owned(key: Vec<u8>, value: Option<Vec<u8>>) -> Item<'static> {
        Item {
            key: Cow::Owned(key),
            value: value.map(Cow::Owned),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// True if the key is stored in the bucket
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// Pass the value to `f`, or `None` if the key does not exist
    pub fn value<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Option<&[u8]>) -> Result<T>,
    {
        f(self.value.as_deref())
    }

    /// Copy of the value
    pub fn value_copy(&self) -> Option<Vec<u8>> {
        self.value.as_deref().map(<[u8]>::to_vec)
    }

    /// Detach the item from the cursor it was read from
    pub fn into_owned(self) -> Item<'static> {
        Item {
            key: Cow::Owned(self.key.into_owned()),
            value: self.value.map(|value| Cow::Owned(value.into_owned())),
        }
    }
}
