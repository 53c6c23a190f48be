use serde::Serialize;
use zerocopy::{
    big_endian::{I32, U16, U32},
    FromBytes,
};

use crate::{
    error::{ForensicError, Result},
    physical::source::ReadAt,
};

pub use self::translate::{HeaderField, TranslatedHeader};

mod translate;

pub const HEADER_STRING: [u8; 16] = *b"SQLite format 3\0";
pub const HEADER_SIZE: usize = 100;

/// Bytes at the start of the page at `page_offset` that precede its b-tree page header.
/// Only the first page has any: the database header lives there.
pub fn reserved(page_offset: u64) -> usize {
    if page_offset == 0 {
        HEADER_SIZE
    } else {
        0
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    zerocopy::FromZeroes,
    zerocopy::FromBytes,
    zerocopy::AsBytes,
    zerocopy::Unaligned,
)]
#[repr(C)]
pub struct DatabaseHeader {
    /// The header string: "SQLite format 3\0"
    header_string: [u8; 16],
    /// The database page size in bytes, or 1 for 65536.
    page_size: U16,
    /// File format write version. 1 for legacy; 2 for WAL.
    write_version: u8,
    /// File format read version. 1 for legacy; 2 for WAL.
    read_version: u8,
    /// Bytes of unused "reserved" space at the end of each page. Usually 0.
    reserved_space: u8,
    /// Maximum embedded payload fraction. Must be 64.
    max_payload_fraction: u8,
    /// Minimum embedded payload fraction. Must be 32.
    min_payload_fraction: u8,
    /// Leaf payload fraction. Must be 32.
    leaf_payload_fraction: u8,
    /// File change counter.
    file_change_counter: U32,
    /// Size of the database file in pages. The "in-header database size".
    database_size: U32,
    /// Page number of the first freelist trunk page.
    freelist_head: U32,
    /// Total number of freelist pages.
    freelist_count: U32,
    /// The schema cookie.
    schema_cookie: U32,
    /// The schema format number. Supported schema formats are 1, 2, 3, and 4.
    schema_format: U32,
    /// Default page cache size.
    default_cache_size: I32,
    /// The page number of the largest root b-tree page when in auto-vacuum or
    /// incremental-vacuum modes, or zero otherwise.
    largest_root_page: U32,
    /// The database text encoding. 1 for UTF-8; 2 for UTF-16le; 3 for UTF-16be.
    text_encoding: U32,
    /// The "user version" as read and set by the user_version pragma.
    user_version: U32,
    /// True (non-zero) for incremental-vacuum mode. False (zero) otherwise.
    incremental_vacuum: U32,
    /// Expansion block. Newer versions keep the application ID in the first four bytes
    /// and leave the rest zeroed.
    expansion: [u8; 24],
    /// The version-valid-for number.
    version_valid_for: U32,
    /// SQLITE_VERSION_NUMBER of the library that last wrote the file.
    sqlite_version: U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl DatabaseHeader {
    /// Reads the first 100 bytes of the file. Does not check the signature.
    pub fn decode<R: ReadAt + ?Sized>(reader: &R) -> Result<Self> {
        let len = reader.size().map_err(|source| ForensicError::Read {
            offset: 0,
            len: HEADER_SIZE,
            source,
        })?;
        if len < HEADER_SIZE as u64 {
            return Err(ForensicError::TruncatedFile { len });
        }

        let bytes = reader.read_bytes(0, HEADER_SIZE)?;
        Self::read_from_prefix(&bytes).ok_or(ForensicError::TruncatedFile { len })
    }

    pub fn check_signature(&self) -> bool {
        self.header_string == HEADER_STRING
    }

    pub fn signature(&self) -> [u8; 16] {
        self.header_string
    }

    pub fn page_size(&self) -> u32 {
        match self.page_size.get() {
            1 => 65536,
            n => n as u32,
        }
    }

    /// The page size less the reserved space at the end of each page.
    pub fn usable_size(&self) -> u32 {
        self.page_size()
            .saturating_sub(self.reserved_space as u32)
    }

    pub fn is_wal(&self) -> bool {
        self.read_version == 2 || self.write_version == 2
    }

    pub fn write_version(&self) -> u8 {
        self.write_version
    }

    pub fn read_version(&self) -> u8 {
        self.read_version
    }

    pub fn reserved_space(&self) -> u8 {
        self.reserved_space
    }

    pub fn payload_fractions(&self) -> (u8, u8, u8) {
        (
            self.max_payload_fraction,
            self.min_payload_fraction,
            self.leaf_payload_fraction,
        )
    }

    pub fn file_change_counter(&self) -> u32 {
        self.file_change_counter.get()
    }

    pub fn database_size(&self) -> u32 {
        self.database_size.get()
    }

    pub fn freelist_head(&self) -> u32 {
        self.freelist_head.get()
    }

    pub fn freelist_count(&self) -> u32 {
        self.freelist_count.get()
    }

    pub fn schema_cookie(&self) -> u32 {
        self.schema_cookie.get()
    }

    pub fn schema_format(&self) -> u32 {
        self.schema_format.get()
    }

    pub fn default_cache_size(&self) -> i32 {
        self.default_cache_size.get()
    }

    pub fn largest_root_page(&self) -> u32 {
        self.largest_root_page.get()
    }

    pub fn text_encoding_raw(&self) -> u32 {
        self.text_encoding.get()
    }

    /// The declared text encoding, or `None` if the field holds anything but 1, 2 or 3.
    pub fn text_encoding(&self) -> Option<TextEncoding> {
        match self.text_encoding.get() {
            1 => Some(TextEncoding::Utf8),
            2 => Some(TextEncoding::Utf16Le),
            3 => Some(TextEncoding::Utf16Be),
            _ => None,
        }
    }

    pub fn user_version(&self) -> u32 {
        self.user_version.get()
    }

    pub fn incremental_vacuum(&self) -> u32 {
        self.incremental_vacuum.get()
    }

    pub fn expansion(&self) -> &[u8; 24] {
        &self.expansion
    }

    pub fn application_id(&self) -> u32 {
        let [a, b, c, d, ..] = self.expansion;
        u32::from_be_bytes([a, b, c, d])
    }

    pub fn version_valid_for(&self) -> u32 {
        self.version_valid_for.get()
    }

    pub fn sqlite_version(&self) -> u32 {
        self.sqlite_version.get()
    }

    pub fn translate(&self) -> TranslatedHeader {
        TranslatedHeader::new(self)
    }
}

impl<'a> TryFrom<&'a [u8]> for DatabaseHeader {
    type Error = ForensicError;

    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        Self::read_from_prefix(bytes).ok_or(ForensicError::TruncatedFile {
            len: bytes.len() as u64,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs::File;

    use zerocopy::{AsBytes, FromZeroes};

    use super::*;

    /// A header as a fresh rollback-journal database with 1024 byte pages would have it.
    pub(crate) fn header_bytes() -> Vec<u8> {
        let mut header = DatabaseHeader::new_zeroed();
        header.header_string = HEADER_STRING;
        header.page_size = 1024.into();
        header.write_version = 1;
        header.read_version = 1;
        header.max_payload_fraction = 64;
        header.min_payload_fraction = 32;
        header.leaf_payload_fraction = 32;
        header.file_change_counter = 3.into();
        header.database_size = 2.into();
        header.schema_format = 4.into();
        header.text_encoding = 1.into();
        header.version_valid_for = 3.into();
        header.sqlite_version = 3040001.into();
        header.as_bytes().to_vec()
    }

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<DatabaseHeader>(), HEADER_SIZE);
    }

    #[test]
    fn test_decode_fixture() {
        let file = File::open("fixtures/deleted.db").unwrap();
        let header = DatabaseHeader::decode(&file).unwrap();

        assert!(header.check_signature());
        assert_eq!(header.page_size(), 1024);
        assert_eq!(header.usable_size(), 1024);
        assert!(!header.is_wal());
        assert_eq!(header.payload_fractions(), (64, 32, 32));
        assert_eq!(header.file_change_counter(), 3);
        assert_eq!(header.database_size(), 2);
        assert_eq!(header.schema_cookie(), 1);
        assert_eq!(header.schema_format(), 4);
        assert_eq!(header.text_encoding(), Some(TextEncoding::Utf8));
        assert_eq!(header.version_valid_for(), 3);
        assert_eq!(header.sqlite_version(), 3040001);
    }

    #[test]
    fn test_decode_matches_synthetic() {
        let bytes = header_bytes();
        let header = DatabaseHeader::decode(bytes.as_slice()).unwrap();
        let fixture = DatabaseHeader::decode(&File::open("fixtures/deleted.db").unwrap()).unwrap();
        assert_eq!(header.page_size(), fixture.page_size());
        assert_eq!(header.text_encoding(), fixture.text_encoding());
    }

    #[test]
    fn test_truncated() {
        let bytes = &header_bytes()[..99];
        let err = DatabaseHeader::decode(bytes).unwrap_err();
        assert!(matches!(err, ForensicError::TruncatedFile { len: 99 }));
    }

    #[test]
    fn test_signature() {
        let mut bytes = header_bytes();
        let header = DatabaseHeader::decode(bytes.as_slice()).unwrap();
        assert!(header.check_signature());

        bytes[..16].copy_from_slice(b"SQLite format 4\0");
        let header = DatabaseHeader::decode(bytes.as_slice()).unwrap();
        assert!(!header.check_signature());
        assert_eq!(&header.signature(), b"SQLite format 4\0");
    }

    #[test]
    fn test_large_page_size() {
        let mut bytes = header_bytes();
        bytes[16..18].copy_from_slice(&[0x00, 0x01]);
        let header = DatabaseHeader::decode(bytes.as_slice()).unwrap();
        assert_eq!(header.page_size(), 65536);

        bytes[16..18].copy_from_slice(&[0x80, 0x00]);
        let header = DatabaseHeader::decode(bytes.as_slice()).unwrap();
        assert_eq!(header.page_size(), 32768);
    }

    #[test]
    fn test_is_wal() {
        let mut bytes = header_bytes();
        bytes[18] = 2;
        assert!(DatabaseHeader::decode(bytes.as_slice()).unwrap().is_wal());

        let mut bytes = header_bytes();
        bytes[19] = 2;
        assert!(DatabaseHeader::decode(bytes.as_slice()).unwrap().is_wal());
    }

    #[test]
    fn test_application_id() {
        let mut bytes = header_bytes();
        bytes[68..72].copy_from_slice(&0x0f05_5112u32.to_be_bytes());
        let header = DatabaseHeader::try_from(bytes.as_slice()).unwrap();
        assert_eq!(header.application_id(), 0x0f05_5112);
    }
}
