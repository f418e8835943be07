//! Data file layout.
//!
//! ```text
//! header:  magic u32 | version u32 | flags u32 | reserved u32
//! record:  len u32 | payload | crc32(payload) u32
//! payload: txn_id u64 | count u32 | op*
//! op:      tag u8 | key_len u32 | key | (val_len u32 | val)   value only for puts
//! ```
//!
//! All integers are little-endian. One record is appended per committed write
//! transaction.

use std::collections::BTreeMap;

use crate::constants::{FORMAT_VERSION, LKV_MAGIC, OP_DELETE, OP_PUT};
use crate::error::{Error, Result};

/// Data file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MetaHeader {
    /// Magic number identifying a lumokv file
    pub(crate) magic: u32,
    /// Format version
    pub(crate) version: u32,
    /// Flags the file was created with
    pub(crate) flags: u32,
}

impl MetaHeader {
    pub(crate) const SIZE: usize = 16;

    pub(crate) fn new(flags: u32) -> Self {
        MetaHeader {
            magic: LKV_MAGIC,
            version: FORMAT_VERSION,
            flags,
        }
    }

    pub(crate) fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Parse and validate a header
    pub(crate) fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::Invalid);
        }
        let mut reader = Reader::new(&buf[..Self::SIZE]);
        let header = MetaHeader {
            magic: reader.u32().ok_or(Error::Invalid)?,
            version: reader.u32().ok_or(Error::Invalid)?,
            flags: reader.u32().ok_or(Error::Invalid)?,
        };

        // Validate magic number
        if header.magic != LKV_MAGIC {
            return Err(Error::Invalid);
        }

        // Validate version
        if header.version != FORMAT_VERSION {
            return Err(Error::VersionMismatch {
                found: header.version,
                expected: FORMAT_VERSION,
            });
        }

        Ok(header)
    }
}

/// One replayed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Decoded commit record
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommitRecord {
    pub(crate) txn_id: u64,
    pub(crate) ops: Vec<RecordOp>,
}

/// Frame the writes of one transaction. `None` values are deletions.
pub(crate) fn encode_commit(txn_id: u64, writes: &BTreeMap<Vec<u8>, Option<Vec<u8>>>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&txn_id.to_le_bytes());
    payload.extend_from_slice(&(writes.len() as u32).to_le_bytes());
    for (key, value) in writes {
        match value {
            Some(value) => {
                payload.push(OP_PUT);
                put_bytes(&mut payload, key);
                put_bytes(&mut payload, value);
            }
            None => {
                payload.push(OP_DELETE);
                put_bytes(&mut payload, key);
            }
        }
    }

    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame
}

/// Decode the record at the start of `buf`.
///
/// Returns the record and the number of bytes it occupies, or `None` if the
/// frame is truncated or fails its checksum. A frame with a valid checksum
/// whose payload does not parse is `Corrupted`.
pub(crate) fn decode_commit(buf: &[u8]) -> Result<Option<(CommitRecord, usize)>> {
    let mut reader = Reader::new(buf);
    let Some(len) = reader.u32() else {
        return Ok(None);
    };
    let len = len as usize;
    let (Some(payload), Some(crc)) = (reader.bytes(len), reader.u32()) else {
        return Ok(None);
    };
    if crc32fast::hash(payload) != crc {
        return Ok(None);
    }

    let record = decode_payload(payload)
        .ok_or_else(|| Error::Corrupted(format!("malformed commit record of {} bytes", len)))?;
    Ok(Some((record, len + 8)))
}

fn decode_payload(payload: &[u8]) -> Option<CommitRecord> {
    let mut reader = Reader::new(payload);
    let txn_id = reader.u64()?;
    let count = reader.u32()? as usize;
    let mut ops = Vec::with_capacity(count.min(payload.len()));
    for _ in 0..count {
        let tag = reader.u8()?;
        let key_len = reader.u32()? as usize;
        let key = reader.bytes(key_len)?.to_vec();
        match tag {
            OP_PUT => {
                let val_len = reader.u32()? as usize;
                let value = reader.bytes(val_len)?.to_vec();
                ops.push(RecordOp::Put(key, value));
            }
            OP_DELETE => ops.push(RecordOp::Delete(key)),
            _ => return None,
        }
    }
    if !reader.is_empty() {
        return None;
    }
    Some(CommitRecord { txn_id, ops })
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Bounds-checked little-endian reader
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.buf.len() < len {
            return None;
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4)?.try_into().ok().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.bytes(8)?.try_into().ok().map(u64::from_le_bytes)
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
