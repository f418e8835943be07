use lazy_static::lazy_static;
use log::{debug, trace, warn};
use memmap2::Mmap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::constants::{
    EnvFlags, DATA_FILE_NAME, DEFAULT_MAX_READERS, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH,
};
use crate::cursor::EnvCursor;
use crate::engine::{Engine, EngineCursor, EngineTxn};
use crate::error::{Error, Result};
use crate::meta::{decode_commit, encode_commit, MetaHeader, RecordOp};
use crate::types::Stat;

lazy_static! {
    static ref CHANGEABLE: EnvFlags = EnvFlags::NOSYNC;
}

/// Committed key space
pub(crate) type Tree = BTreeMap<Vec<u8>, Vec<u8>>;
/// Uncommitted writes of one transaction, `None` marks a deletion
pub(crate) type WriteSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Ordered key-value environment, in memory or backed by a data file.
///
/// Committed state is published as an immutable snapshot. Readers pin the
/// snapshot current when they begin; a single writer at a time buffers its
/// writes and publishes a new snapshot on commit.
#[derive(Debug)]
pub struct Environment {
    /// Path to the data file, empty for in-memory environments
    path: PathBuf,
    /// Environment flags
    flags: AtomicU32,
    /// Maximum number of concurrently open transactions
    max_readers: u32,
    /// Last committed snapshot
    tree: RwLock<Arc<Tree>>,
    /// Held by the active write transaction
    writer: Mutex<()>,
    /// Thread running the active write transaction
    writer_thread: Mutex<Option<ThreadId>>,
    /// Append handle for commit records
    data_file: Mutex<Option<File>>,
    /// Id of the last committed write transaction
    txn_id: AtomicU64,
    /// Number of open transactions
    num_readers: AtomicU32,
    /// Environment is initialized
    initialized: AtomicBool,
    /// Environment was closed
    closed: AtomicBool,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    /// Create a new, unopened environment
    pub fn new() -> Self {
        Environment {
            path: PathBuf::new(),
            flags: AtomicU32::new(0),
            max_readers: DEFAULT_MAX_READERS,
            tree: RwLock::new(Arc::new(Tree::new())),
            writer: Mutex::new(()),
            writer_thread: Mutex::new(None),
            data_file: Mutex::new(None),
            txn_id: AtomicU64::new(0),
            num_readers: AtomicU32::new(0),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Set the maximum number of concurrently open transactions.
    ///
    /// Must be called before the environment is opened.
    pub fn set_max_readers(&mut self, readers: u32) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::EnvAlreadyOpen);
        }
        self.max_readers = readers;
        Ok(())
    }

    pub fn get_max_readers(&self) -> u32 {
        self.max_readers
    }

    /// Open a file-backed environment.
    ///
    /// `path` is a directory holding the data file, or the data file itself
    /// when `NOSUBDIR` is set. Existing commit records are replayed; a torn
    /// record at the tail is discarded, a checksummed record that does not
    /// parse fails the open with `Corrupted`.
    pub fn open<P: AsRef<Path>>(mut self, path: P, flags: EnvFlags) -> Result<Self> {
        if self.is_initialized() {
            return Err(Error::EnvAlreadyOpen);
        }
        let readonly = flags.contains(EnvFlags::RDONLY);

        self.path = if flags.contains(EnvFlags::NOSUBDIR) {
            path.as_ref().to_path_buf()
        } else {
            if !readonly {
                fs::create_dir_all(path.as_ref())?;
            }
            path.as_ref().join(DATA_FILE_NAME)
        };

        // Open data file
        let mut data_file = OpenOptions::new()
            .read(true)
            .append(!readonly)
            .create(!readonly)
            .open(&self.path)?;
        let file_size = data_file.metadata()?.len();

        if file_size == 0 {
            if !readonly {
                data_file.write_all(&MetaHeader::new(flags.bits()).to_bytes())?;
                data_file.sync_all()?;
            }
        } else {
            let tree = self.replay(&data_file, readonly)?;
            self.tree = RwLock::new(Arc::new(tree));
        }

        self.flags.store(flags.bits(), Ordering::SeqCst);
        if !readonly {
            self.data_file = Mutex::new(Some(data_file));
        }
        self.initialized.store(true, Ordering::SeqCst);

        debug!(
            "environment opened at {} (txn {})",
            self.path.display(),
            self.txn_id.load(Ordering::SeqCst)
        );
        Ok(self)
    }

    /// Open an environment that lives only in memory
    pub fn open_memory(self) -> Result<Self> {
        if self.is_initialized() {
            return Err(Error::EnvAlreadyOpen);
        }
        self.initialized.store(true, Ordering::SeqCst);
        debug!("in-memory environment opened");
        Ok(self)
    }

    /// Rebuild the key space from the commit records in `file`
    fn replay(&self, file: &File, readonly: bool) -> Result<Tree> {
        // Safety: the file is only appended to through this environment
        let map = unsafe { Mmap::map(file)? };
        MetaHeader::from_bytes(&map)?;

        let mut tree = Tree::new();
        let mut offset = MetaHeader::SIZE;
        let mut records = 0usize;
        while offset < map.len() {
            let Some((record, used)) = decode_commit(&map[offset..])? else {
                break;
            };
            for op in record.ops {
                match op {
                    RecordOp::Put(key, value) => {
                        tree.insert(key, value);
                    }
                    RecordOp::Delete(key) => {
                        tree.remove(&key);
                    }
                }
            }
            self.txn_id.store(record.txn_id, Ordering::SeqCst);
            offset += used;
            records += 1;
        }

        if offset < map.len() {
            warn!(
                "discarding {} trailing bytes of {} after {} records",
                map.len() - offset,
                self.path.display(),
                records
            );
            drop(map);
            if !readonly {
                file.set_len(offset as u64)?;
                file.sync_all()?;
            }
        }
        trace!("replayed {} records from {}", records, self.path.display());
        Ok(tree)
    }

    /// Begin a transaction
    pub fn begin_txn(&self) -> Result<EnvTxn<'_>> {
        self.begin(true)
    }

    /// Begin a read-only transaction
    pub fn begin_ro_txn(&self) -> Result<EnvTxn<'_>> {
        self.begin(false)
    }

    fn begin(&self, writable: bool) -> Result<EnvTxn<'_>> {
        self.check_open()?;
        if writable && self.is_readonly() {
            return Err(Error::EnvReadOnly);
        }

        let slot = ReaderSlot::acquire(self)?;

        // Single writer: block until the active write transaction finishes.
        // The lock is not reentrant, so a thread that already writes fails.
        let writer = if writable {
            let current = thread::current().id();
            if *self.writer_thread.lock() == Some(current) {
                return Err(Error::WriterBusy);
            }
            let guard = WriterGuard::acquire(self, current);
            self.check_open()?;
            Some(guard)
        } else {
            None
        };

        let snapshot = self.tree.read().clone();
        let committed = self.txn_id.load(Ordering::SeqCst);
        let id = if writable { committed + 1 } else { committed };

        Ok(EnvTxn {
            env: self,
            id,
            snapshot,
            writes: writable.then(|| RefCell::new(WriteSet::new())),
            _writer: writer,
            _slot: slot,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::EnvClosed);
        }
        if !self.is_initialized() {
            return Err(Error::EnvNotInitialized);
        }
        Ok(())
    }

    /// Persist and publish the writes of transaction `id`
    fn publish(&self, id: u64, writes: WriteSet) -> Result<()> {
        self.check_open()?;

        if let Some(file) = self.data_file.lock().as_mut() {
            let sync = !self.flags().contains(EnvFlags::NOSYNC);
            append_frame(file, &encode_commit(id, &writes), sync)?;
        }

        let mut tree = self.tree.write();
        let tree = Arc::make_mut(&mut tree);
        for (key, value) in writes {
            match value {
                Some(value) => {
                    tree.insert(key, value);
                }
                None => {
                    tree.remove(&key);
                }
            }
        }
        self.txn_id.store(id, Ordering::SeqCst);
        Ok(())
    }

    /// Flush the data file to disk
    pub fn sync(&self) -> Result<()> {
        if self.is_readonly() {
            return Err(Error::EnvReadOnly);
        }
        self.check_open()?;
        if let Some(file) = self.data_file.lock().as_ref() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Close the environment.
    ///
    /// Transactions begun afterwards fail with `EnvClosed`. Open
    /// transactions keep their snapshot but can no longer commit.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(file) = self.data_file.lock().take() {
            if let Err(err) = file.sync_all() {
                warn!("sync on close of {} failed: {}", self.path.display(), err);
            }
        }
        debug!("environment closed");
    }

    /// Set environment flags. Only `NOSYNC` may be changed after open.
    pub fn set_flags(&self, flags: EnvFlags, onoff: bool) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::EnvNotInitialized);
        }
        if !CHANGEABLE.contains(flags) {
            return Err(Error::EnvFlagsImmutable);
        }
        if onoff {
            self.flags.fetch_or(flags.bits(), Ordering::SeqCst);
        } else {
            self.flags.fetch_and(!flags.bits(), Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn flags(&self) -> EnvFlags {
        EnvFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }

    /// Path of the data file, `None` for in-memory environments
    pub fn path(&self) -> Option<&Path> {
        if self.path.as_os_str().is_empty() {
            None
        } else {
            Some(&self.path)
        }
    }

    pub fn stat(&self) -> Result<Stat> {
        self.check_open()?;
        let file_size = match self.path() {
            Some(path) => fs::metadata(path)?.len(),
            None => 0,
        };
        Ok(Stat {
            entries: self.tree.read().len(),
            last_txn_id: self.txn_id.load(Ordering::SeqCst),
            num_readers: self.num_readers.load(Ordering::SeqCst),
            file_size,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_readonly(&self) -> bool {
        self.flags().contains(EnvFlags::RDONLY)
    }

    /// Get library version
    pub fn version() -> (u32, u32, u32) {
        (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
    }

    pub fn version_string() -> String {
        format!("{}.{}.{}", VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
    }
}

impl Engine for Environment {
    fn begin_txn(&self, writable: bool) -> Result<Box<dyn EngineTxn + '_>> {
        Ok(Box::new(self.begin(writable)?))
    }

    fn sync(&self) -> Result<()> {
        Environment::sync(self)
    }

    fn close(&self) -> Result<()> {
        Environment::close(self);
        Ok(())
    }
}

/// Append-only destination of commit frames
pub(crate) trait FrameLog {
    fn len(&self) -> io::Result<u64>;

    fn append(&mut self, frame: &[u8]) -> io::Result<()>;

    fn sync_data(&self) -> io::Result<()>;

    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl FrameLog for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn append(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame)
    }

    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Append one frame, syncing it when `sync` is set.
///
/// A frame that was not fully written and synced is cut off again, so a
/// commit reported as failed is never replayed.
pub(crate) fn append_frame<L: FrameLog>(log: &mut L, frame: &[u8], sync: bool) -> Result<()> {
    let len = log.len()?;
    let written = log
        .append(frame)
        .and_then(|()| if sync { log.sync_data() } else { Ok(()) });
    if let Err(err) = written {
        log.set_len(len)?;
        return Err(err.into());
    }
    Ok(())
}

/// Writer lock tagged with the thread holding it
struct WriterGuard<'env> {
    env: &'env Environment,
    _lock: MutexGuard<'env, ()>,
}

impl<'env> WriterGuard<'env> {
    fn acquire(env: &'env Environment, thread: ThreadId) -> Self {
        let lock = env.writer.lock();
        *env.writer_thread.lock() = Some(thread);
        WriterGuard { env, _lock: lock }
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        *self.env.writer_thread.lock() = None;
    }
}

/// Counted transaction slot, released on drop
#[derive(Debug)]
struct ReaderSlot<'env> {
    env: &'env Environment,
}

impl<'env> ReaderSlot<'env> {
    fn acquire(env: &'env Environment) -> Result<Self> {
        let previous = env.num_readers.fetch_add(1, Ordering::SeqCst);
        if previous >= env.max_readers {
            env.num_readers.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::ReadersFull);
        }
        Ok(ReaderSlot { env })
    }
}

impl Drop for ReaderSlot<'_> {
    fn drop(&mut self) {
        self.env.num_readers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Environment transaction.
///
/// Reads see the snapshot pinned at begin, overlaid with this transaction's
/// own writes. Dropping without `commit` discards the writes.
pub struct EnvTxn<'env> {
    /// Owning environment
    env: &'env Environment,
    /// Transaction ID
    id: u64,
    /// Committed state at begin
    snapshot: Arc<Tree>,
    /// Buffered writes, `None` for read-only transactions
    writes: Option<RefCell<WriteSet>>,
    /// Writer lock, held by write transactions
    _writer: Option<WriterGuard<'env>>,
    /// Transaction slot
    _slot: ReaderSlot<'env>,
}

impl<'env> EnvTxn<'env> {
    /// Get transaction ID
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_readonly(&self) -> bool {
        self.writes.is_none()
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(writes) = &self.writes {
            if let Some(value) = writes.borrow().get(key) {
                return value.clone();
            }
        }
        self.snapshot.get(key).cloned()
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let writes = self.writes.as_ref().ok_or(Error::TxnReadOnly)?;
        writes.borrow_mut().insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    pub fn del(&self, key: &[u8]) -> Result<()> {
        let writes = self.writes.as_ref().ok_or(Error::TxnReadOnly)?;
        let mut writes = writes.borrow_mut();
        if self.snapshot.contains_key(key) {
            writes.insert(key.to_vec(), None);
        } else {
            writes.remove(key);
        }
        Ok(())
    }

    /// Create a cursor over this transaction
    pub fn cursor(&self, reverse: bool) -> EnvCursor<'_, 'env> {
        EnvCursor::new(self, reverse)
    }

    /// Commit the transaction
    pub fn commit(self) -> Result<()> {
        let EnvTxn {
            env,
            id,
            snapshot,
            writes,
            _writer,
            _slot,
        } = self;

        let writes = match writes {
            Some(writes) => writes.into_inner(),
            None => return Ok(()),
        };
        if writes.is_empty() {
            return Ok(());
        }

        // Release the pinned snapshot so publishing can reuse it in place
        drop(snapshot);
        let count = writes.len();
        env.publish(id, writes)?;
        debug!("txn {} committed {} writes", id, count);
        Ok(())
    }

    /// Abort the transaction
    pub fn abort(self) {
        if let Some(writes) = &self.writes {
            trace!("txn {} aborted, {} writes dropped", self.id, writes.borrow().len());
        }
    }

    /// Nearest visible entry from `from` in the given direction.
    ///
    /// Buffered writes shadow the snapshot; deletions are skipped.
    pub(crate) fn neighbor(&self, from: Bound<&[u8]>, reverse: bool) -> Option<(Vec<u8>, Vec<u8>)> {
        let writes = self.writes.as_ref().map(RefCell::borrow);
        let mut bound: Bound<Vec<u8>> = match from {
            Bound::Included(key) => Bound::Included(key.to_vec()),
            Bound::Excluded(key) => Bound::Excluded(key.to_vec()),
            Bound::Unbounded => Bound::Unbounded,
        };

        loop {
            let near = match &bound {
                Bound::Included(key) => Bound::Included(key.as_slice()),
                Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
                Bound::Unbounded => Bound::Unbounded,
            };
            let range = if reverse {
                (Bound::Unbounded, near)
            } else {
                (near, Bound::Unbounded)
            };

            let base = {
                let mut iter = self.snapshot.range::<[u8], _>(range);
                if reverse {
                    iter.next_back()
                } else {
                    iter.next()
                }
            };
            let overlay = writes.as_ref().and_then(|writes| {
                let mut iter = writes.range::<[u8], _>(range);
                if reverse {
                    iter.next_back()
                } else {
                    iter.next()
                }
            });

            let overlay_first = match (base, overlay) {
                (None, None) => return None,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (Some((base_key, _)), Some((overlay_key, _))) => {
                    if reverse {
                        overlay_key >= base_key
                    } else {
                        overlay_key <= base_key
                    }
                }
            };

            if !overlay_first {
                return base.map(|(key, value)| (key.clone(), value.clone()));
            }
            match overlay {
                Some((key, Some(value))) => return Some((key.clone(), value.clone())),
                Some((key, None)) => bound = Bound::Excluded(key.clone()),
                None => return None,
            }
        }
    }
}

impl EngineTxn for EnvTxn<'_> {
    fn is_writable(&self) -> bool {
        !self.is_readonly()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(EnvTxn::get(self, key))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.del(key)
    }

    fn cursor(&self, reverse: bool) -> Box<dyn EngineCursor + '_> {
        Box::new(EnvCursor::new(self, reverse))
    }

    fn commit(self: Box<Self>) -> Result<()> {
        EnvTxn::commit(*self)
    }

    fn rollback(self: Box<Self>) {
        self.abort()
    }
}
