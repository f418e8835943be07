use std::borrow::Cow;
use std::fmt;

/// Name of a bucket. The raw bytes double as the key prefix of every entry
/// stored in the bucket.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BucketName(Vec<u8>);

impl BucketName {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        BucketName(name.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lossy UTF-8 view, used for messages
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketName({:?})", self.to_string_lossy())
    }
}

impl AsRef<[u8]> for BucketName {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for BucketName {
    fn from(name: &str) -> Self {
        BucketName(name.as_bytes().to_vec())
    }
}

impl From<String> for BucketName {
    fn from(name: String) -> Self {
        BucketName(name.into_bytes())
    }
}

impl From<&[u8]> for BucketName {
    fn from(name: &[u8]) -> Self {
        BucketName(name.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for BucketName {
    fn from(name: &[u8; N]) -> Self {
        BucketName(name.to_vec())
    }
}

impl From<Vec<u8>> for BucketName {
    fn from(name: Vec<u8>) -> Self {
        BucketName(name)
    }
}

impl From<&BucketName> for BucketName {
    fn from(name: &BucketName) -> Self {
        name.clone()
    }
}

/// Environment statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    /// Number of committed entries, registry keys included
    pub entries: usize,
    /// Id of the last committed write transaction
    pub last_txn_id: u64,
    /// Number of transactions currently open
    pub num_readers: u32,
    /// Size of the data file in bytes, zero for in-memory environments
    pub file_size: u64,
}
