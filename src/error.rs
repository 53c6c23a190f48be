use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T, E = ForensicError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ForensicError {
    #[error("could not open {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("file is {len} bytes long, too short to hold the 100-byte database header")]
    TruncatedFile { len: u64 },
    #[error("corrupt or encrypted database: signature is {found:02x?}")]
    SignatureMismatch { found: [u8; 16] },
    #[error("malformed varint at offset {offset}")]
    MalformedVarint { offset: u64 },
    #[error("malformed record in cell at offset {cell_offset}: {reason}")]
    MalformedRecord {
        cell_offset: u64,
        reason: &'static str,
    },
    #[error("malformed b-tree page at offset {page_offset}: {reason}")]
    MalformedPage {
        page_offset: u64,
        reason: &'static str,
    },
    #[error("corrupt freeblock chain in page at offset {page_offset} (freeblock {freeblock}): {reason}")]
    CorruptFreeblockChain {
        page_offset: u64,
        freeblock: u16,
        reason: &'static str,
    },
    #[error("unknown page type {flag:#04x} at offset {offset}")]
    UnknownPageType { offset: u64, flag: u8 },
    #[error("reserved serial type {code} in cell at offset {cell_offset}")]
    ReservedSerialType { cell_offset: u64, code: u64 },
    #[error("could not read {len} bytes at offset {offset}: {source}")]
    Read {
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },
}

impl ForensicError {
    /// Errors that make every later conclusion about the file unreliable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ForensicError::FileOpen { .. }
                | ForensicError::TruncatedFile { .. }
                | ForensicError::SignatureMismatch { .. }
        )
    }
}
