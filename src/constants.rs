use bitflags::bitflags;

// Environment flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnvFlags: u32 {
        const NOSUBDIR = 0x4000;
        const NOSYNC = 0x10000;
        const RDONLY = 0x20000;
    }
}

/// Byte appended to a bucket name to form its key prefix
pub const BUCKET_DELIMITER: u8 = b'_';

/// Name of the data file inside an environment directory
pub const DATA_FILE_NAME: &str = "data.lkv";
/// Magic number for lumokv data files
pub const LKV_MAGIC: u32 = 0xBEEF_C0DE;
/// Version numbers major
pub const VERSION_MAJOR: u32 = 0;
/// Version numbers minor
pub const VERSION_MINOR: u32 = 1;
/// Version numbers patch
pub const VERSION_PATCH: u32 = 0;
/// On-disk format version, bumped on any layout change
pub const FORMAT_VERSION: u32 = 1;

/// Default maximum number of concurrent transactions
pub const DEFAULT_MAX_READERS: u32 = 126;

/// Record operation tags
pub(crate) const OP_PUT: u8 = 1;
pub(crate) const OP_DELETE: u8 = 2;
