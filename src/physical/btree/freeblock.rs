use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;
use zerocopy::{big_endian::U16, FromBytes};

use crate::{
    error::{ForensicError, Result},
    physical::source::ReadAt,
};

/// A free-block inside a b-tree page: space released by a deleted cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Freeblock {
    /// Offset of the block from the start of the page.
    pub offset: u16,
    /// Offset of the next block, or 0 for the last one.
    pub next: u16,
    /// Size of the block, including its own 4-byte header.
    pub size: u16,
}

#[derive(zerocopy::FromZeroes, zerocopy::FromBytes, zerocopy::Unaligned)]
#[repr(C)]
struct FreeblockHeader {
    next: U16,
    size: U16,
}

pub const FREEBLOCK_HEADER_SIZE: u16 = 4;

/// The most free-blocks a page of `page_size` bytes can physically hold.
pub fn default_limit(page_size: u32) -> usize {
    (page_size / FREEBLOCK_HEADER_SIZE as u32) as usize
}

/// Follows the free-block list of the page at `page_offset`, starting at `first`.
///
/// The on-disk format has no protection against cycles, so the walk gives up with
/// [`ForensicError::CorruptFreeblockChain`] on a revisited offset, a block outside the
/// page, or after `limit` blocks.
pub fn walk<R: ReadAt + ?Sized>(
    reader: &R,
    page_offset: u64,
    first: u16,
    page_size: u32,
    limit: usize,
) -> Result<Vec<Freeblock>> {
    let corrupt = |freeblock: u16, reason: &'static str| {
        warn!(page_offset, freeblock, reason, "corrupt freeblock chain");
        ForensicError::CorruptFreeblockChain {
            page_offset,
            freeblock,
            reason,
        }
    };

    let mut freeblocks = Vec::new();
    let mut visited = HashSet::new();
    let mut offset = first;

    while offset != 0 {
        if freeblocks.len() >= limit {
            return Err(corrupt(offset, "more freeblocks than the page can hold"));
        }
        if !visited.insert(offset) {
            return Err(corrupt(offset, "chain loops back to an earlier freeblock"));
        }
        if offset as u32 + FREEBLOCK_HEADER_SIZE as u32 > page_size {
            return Err(corrupt(offset, "freeblock starts outside the page"));
        }

        let bytes = reader.read_bytes(
            page_offset + offset as u64,
            FREEBLOCK_HEADER_SIZE as usize,
        )?;
        let header = FreeblockHeader::read_from(bytes.as_slice())
            .ok_or_else(|| corrupt(offset, "freeblock header is unreadable"))?;
        let next = header.next.get();
        let size = header.size.get();

        if size < FREEBLOCK_HEADER_SIZE {
            return Err(corrupt(offset, "freeblock is smaller than its own header"));
        }
        if offset as u32 + size as u32 > page_size {
            return Err(corrupt(offset, "freeblock runs past the end of the page"));
        }

        freeblocks.push(Freeblock { offset, next, size });
        offset = next;
    }

    Ok(freeblocks)
}
