use serde::Serialize;
use tracing::debug;
use zerocopy::big_endian::{U16, U32};

use crate::{
    error::{ForensicError, Result},
    physical::{
        buf::Buf,
        header::{self as db_header},
        source::ReadAt,
    },
};

pub use self::freeblock::Freeblock;

pub mod freeblock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BTreePageType {
    InteriorIndex,
    InteriorTable,
    LeafIndex,
    LeafTable,
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
struct RawPageHeader {
    /// The b-tree page type.
    flags: u8,
    /// The start of the first freeblock on the page, or 0 if there are no freeblocks.
    first_freeblock: U16,
    /// The number of cells on this page.
    cell_count: U16,
    /// The start of the cell content area. A zero value for this is interpreted as 65536.
    cell_content_start: U16,
    /// The number of fragmented free bytes within the cell content area.
    fragmented_free_bytes: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageHeader {
    pub page_type: BTreePageType,
    pub first_freeblock: u16,
    pub cell_count: u16,
    /// Raw content area start; see [`PageHeader::content_area_offset`].
    pub cell_content_start: u16,
    pub fragmented_free_bytes: u8,
    /// The right-most child pointer. Only present on interior pages.
    pub right_most_pointer: Option<u32>,
}

/// A decoded b-tree page: its header and cell-pointer array. Cell contents are left
/// on disk and decoded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BTreePage {
    offset: u64,
    page_size: u32,
    header: PageHeader,
    cell_pointers: Vec<u16>,
    cell_pointer_array_end: u32,
}

impl BTreePage {
    /// Decodes the page starting at `page_offset` in the file.
    pub fn decode<R: ReadAt + ?Sized>(reader: &R, page_offset: u64, page_size: u32) -> Result<Self> {
        let start = db_header::reserved(page_offset);
        let header_offset = page_offset + start as u64;

        let flags = reader.read_u8(header_offset)?;
        let page_type =
            BTreePageType::from_flag(flags).ok_or(ForensicError::UnknownPageType {
                offset: page_offset,
                flag: flags,
            })?;
        let header_size = page_type.header_size();

        let bytes = reader.read_bytes(header_offset, header_size)?;
        let mut data = bytes.as_slice();
        let raw = data
            .consume::<RawPageHeader>()
            .ok_or(ForensicError::MalformedPage {
                page_offset,
                reason: "page header is unreadable",
            })?;
        let right_most_pointer = if page_type.is_leaf() {
            None
        } else {
            data.consume::<U32>().map(|ptr| ptr.get())
        };

        let header = PageHeader {
            page_type,
            first_freeblock: raw.first_freeblock.get(),
            cell_count: raw.cell_count.get(),
            cell_content_start: raw.cell_content_start.get(),
            fragmented_free_bytes: raw.fragmented_free_bytes,
            right_most_pointer,
        };

        let array_start = start + header_size;
        let array_end = array_start + header.cell_count as usize * 2;
        if array_end > page_size as usize {
            return Err(ForensicError::MalformedPage {
                page_offset,
                reason: "cell pointer array runs past the end of the page",
            });
        }

        let bytes = reader.read_bytes(page_offset + array_start as u64, array_end - array_start)?;
        let mut data = bytes.as_slice();
        let cell_pointers = (0..header.cell_count)
            .map_while(|_| data.consume::<U16>().map(|ptr| ptr.get()))
            .collect::<Vec<_>>();

        debug!(
            page_offset,
            ?page_type,
            cell_count = header.cell_count,
            first_freeblock = header.first_freeblock,
            "decoded page header"
        );

        Ok(Self {
            offset: page_offset,
            page_size,
            header,
            cell_pointers,
            cell_pointer_array_end: array_end as u32,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn page_type(&self) -> BTreePageType {
        self.header.page_type
    }

    pub fn cell_count(&self) -> u16 {
        self.header.cell_count
    }

    /// Cell offsets relative to the start of the page, in cell order.
    pub fn cell_pointers(&self) -> &[u16] {
        &self.cell_pointers
    }

    /// Absolute file offsets of the cells.
    pub fn cell_offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.cell_pointers
            .iter()
            .map(|&ptr| self.offset + ptr as u64)
    }

    /// First byte past the cell-pointer array, relative to the start of the page.
    pub fn cell_pointer_array_end(&self) -> u32 {
        self.cell_pointer_array_end
    }

    pub fn freeblocks<R: ReadAt + ?Sized>(&self, reader: &R) -> Result<Vec<Freeblock>> {
        self.freeblocks_with_limit(reader, freeblock::default_limit(self.page_size))
    }

    pub fn freeblocks_with_limit<R: ReadAt + ?Sized>(
        &self,
        reader: &R,
        limit: usize,
    ) -> Result<Vec<Freeblock>> {
        freeblock::walk(
            reader,
            self.offset,
            self.header.first_freeblock,
            self.page_size,
            limit,
        )
    }
}

/// Decodes a page along with its free-block list.
pub fn decode_leaf<R: ReadAt + ?Sized>(
    reader: &R,
    page_offset: u64,
    page_size: u32,
) -> Result<(BTreePage, Vec<Freeblock>)> {
    let page = BTreePage::decode(reader, page_offset, page_size)?;
    let freeblocks = page.freeblocks(reader)?;
    Ok((page, freeblocks))
}

impl PageHeader {
    /// Start of the cell content area relative to the start of the page.
    pub fn content_area_offset(&self) -> u32 {
        match self.cell_content_start {
            0 => 65536,
            n => n as u32,
        }
    }
}

impl BTreePageType {
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0x02 => Some(BTreePageType::InteriorIndex),
            0x05 => Some(BTreePageType::InteriorTable),
            0x0a => Some(BTreePageType::LeafIndex),
            0x0d => Some(BTreePageType::LeafTable),
            _ => None,
        }
    }

    pub fn is_leaf(self) -> bool {
        match self {
            BTreePageType::InteriorIndex | BTreePageType::InteriorTable => false,
            BTreePageType::LeafIndex | BTreePageType::LeafTable => true,
        }
    }

    pub fn header_size(self) -> usize {
        if self.is_leaf() {
            8
        } else {
            12
        }
    }
}

impl From<BTreePageType> for u8 {
    fn from(value: BTreePageType) -> Self {
        match value {
            BTreePageType::InteriorIndex => 0x02,
            BTreePageType::InteriorTable => 0x05,
            BTreePageType::LeafIndex => 0x0a,
            BTreePageType::LeafTable => 0x0d,
        }
    }
}
