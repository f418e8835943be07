use std::io;
use std::result;

use thiserror::Error;

use crate::types::BucketName;

/// Custom result type for lumokv operations
pub type Result<T> = result::Result<T, Error>;

/// lumokv error kinds
#[derive(Debug, Error)]
pub enum Error {
    /// A transaction is already open on the calling context
    #[error("transaction already open")]
    TransactionAlreadyOpen,
    /// Bucket does not exist
    #[error("bucket '{0}' not found")]
    NotFound(BucketName),
    /// Bucket is already registered
    #[error("bucket '{0}' already exists")]
    AlreadyExists(BucketName),
    /// Bucket name is empty or contains the delimiter byte
    #[error("invalid bucket name '{name}': {reason}")]
    InvalidBucketName {
        name: BucketName,
        reason: &'static str,
    },
    /// Context was cancelled before the transaction started
    #[error("context cancelled")]
    Cancelled,
    /// Context deadline passed before the transaction started
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// Environment is not initialized
    #[error("environment is not initialized")]
    EnvNotInitialized,
    /// Environment is already open
    #[error("environment is already open")]
    EnvAlreadyOpen,
    /// Environment is closed
    #[error("environment is closed")]
    EnvClosed,
    /// Environment is read-only
    #[error("environment is read-only")]
    EnvReadOnly,
    /// Environment flags cannot be modified
    #[error("environment flags cannot be modified")]
    EnvFlagsImmutable,
    /// Write attempted through a read-only transaction
    #[error("transaction is read-only")]
    TxnReadOnly,
    /// The calling thread already holds the write transaction
    #[error("write transaction already open on this thread")]
    WriterBusy,
    /// Maximum number of concurrent transactions reached
    #[error("environment maxreaders limit reached")]
    ReadersFull,
    /// File is not a valid lumokv data file
    #[error("file is not a valid lumokv data file")]
    Invalid,
    /// Data file format version mismatch
    #[error("data file version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    /// Data file is corrupted
    #[error("data file is corrupted: {0}")]
    Corrupted(String),
    /// Receiving side of a stream went away
    #[error("stream receiver disconnected")]
    ChannelClosed,
    /// Stored value could not be decoded
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    /// I/O failure
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Error with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
    /// Error raised by caller code inside a transaction
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary caller error
    pub fn other<E>(err: E) -> Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Other(err.into())
    }

    /// Attach operation context to this error
    pub fn context(self, context: impl Into<String>) -> Error {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all context layers removed
    pub fn root(&self) -> &Error {
        let mut err = self;
        while let Error::Context { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn is_transaction_already_open(&self) -> bool {
        matches!(self.root(), Error::TransactionAlreadyOpen)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Error::AlreadyExists(_))
    }
}

/// Helper trait for attaching context to results
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|err| err.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| err.context(f()))
    }
}
