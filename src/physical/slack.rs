use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::Result,
    physical::{
        btree::{freeblock::FREEBLOCK_HEADER_SIZE, Freeblock, PageHeader},
        source::ReadAt,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlackSource {
    /// Between the end of the cell-pointer array and the start of the cell content area.
    Gap,
    /// The body of a free-block, after its 4-byte header.
    Freeblock { offset: u16, size: u16 },
}

/// A byte range of a page that no live cell covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlackRegion {
    pub source: SlackSource,
    /// Absolute file offset of the first byte.
    pub offset: u64,
    pub length: u64,
    pub raw: Vec<u8>,
    pub sanitized: Vec<u8>,
}

impl SlackRegion {
    fn new(source: SlackSource, offset: u64, raw: Vec<u8>) -> Self {
        Self {
            source,
            offset,
            length: raw.len() as u64,
            sanitized: sanitize(&raw),
            raw,
        }
    }

    /// The sanitized bytes as text, with invalid UTF-8 replaced.
    pub fn sanitized_text(&self) -> String {
        String::from_utf8_lossy(&self.sanitized).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Drops C0 and C1 control bytes (0x00-0x1F and 0x7F-0x9F).
pub fn sanitize(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|&byte| !matches!(byte, 0x00..=0x1f | 0x7f..=0x9f))
        .collect()
}

/// Recovers the unallocated regions of the page at `page_offset`: the gap after the
/// cell-pointer array first, then every free-block in chain order. The gap never
/// extends past the end of the page.
pub fn extract<R: ReadAt + ?Sized>(
    reader: &R,
    page_offset: u64,
    page_size: u32,
    header: &PageHeader,
    cell_pointer_array_end: u32,
    freeblocks: &[Freeblock],
) -> Result<Vec<SlackRegion>> {
    let mut regions = Vec::with_capacity(freeblocks.len() + 1);

    let content_start = header.content_area_offset();
    if content_start > page_size {
        warn!(page_offset, content_start, page_size, "content area starts past the page");
    }
    let gap_start = cell_pointer_array_end as u64;
    let gap_end = (content_start.min(page_size) as u64).max(gap_start);
    let gap = reader.read_bytes(page_offset + gap_start, (gap_end - gap_start) as usize)?;
    regions.push(SlackRegion::new(
        SlackSource::Gap,
        page_offset + gap_start,
        gap,
    ));

    for freeblock in freeblocks {
        let start = page_offset + freeblock.offset as u64 + FREEBLOCK_HEADER_SIZE as u64;
        let length = freeblock.size.saturating_sub(FREEBLOCK_HEADER_SIZE);
        let raw = reader.read_bytes(start, length as usize)?;
        regions.push(SlackRegion::new(
            SlackSource::Freeblock {
                offset: freeblock.offset,
                size: freeblock.size,
            },
            start,
            raw,
        ));
    }

    debug!(page_offset, regions = regions.len(), "extracted slack");
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use crate::physical::btree::{decode_leaf, BTreePageType};

    use super::*;

    fn leaf_header(cell_count: u16, cell_content_start: u16, first_freeblock: u16) -> PageHeader {
        PageHeader {
            page_type: BTreePageType::LeafTable,
            first_freeblock,
            cell_count,
            cell_content_start,
            fragmented_free_bytes: 0,
            right_most_pointer: None,
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize(b"\x00ab\x1fc\x7f\x80\x9f\xa0d"),
            b"abc\xa0d".to_vec()
        );
        assert_eq!(sanitize(&[0x20, 0x7e]), vec![0x20, 0x7e]);
    }

    #[test]
    fn test_gap_only() {
        let mut page = vec![0; 512];
        page[20..25].copy_from_slice(b"ghost");
        let header = leaf_header(3, 400, 0);

        let regions = extract(page.as_slice(), 0, 512, &header, 14, &[]).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].source, SlackSource::Gap);
        assert_eq!(regions[0].offset, 14);
        assert_eq!(regions[0].length, 386);
        assert_eq!(regions[0].sanitized, b"ghost".to_vec());
    }

    #[test]
    fn test_zero_length_gap() {
        let page = vec![0; 512];
        let header = leaf_header(3, 10, 0);
        let regions = extract(page.as_slice(), 0, 512, &header, 14, &[]).unwrap();
        assert_eq!(regions.len(), 1);
        assert!(regions[0].is_empty());
    }

    #[test]
    fn test_gap_stays_on_its_page() {
        let mut file = vec![0; 2048];
        file[1024..1030].copy_from_slice(b"NEXTPG");
        let header = leaf_header(0, 1500, 0);

        let regions = extract(file.as_slice(), 0, 1024, &header, 8, &[]).unwrap();
        assert_eq!(regions[0].offset, 8);
        assert_eq!(regions[0].length, 1016);
        assert!(regions[0].sanitized.is_empty());

        // Raw 0 reads as 65536, far past a small page and the end of the file.
        let header = leaf_header(0, 0, 0);
        let regions = extract(file.as_slice(), 1024, 1024, &header, 8, &[]).unwrap();
        assert_eq!(regions[0].offset, 1032);
        assert_eq!(regions[0].length, 1016);
    }

    #[test]
    fn test_freeblock_regions() {
        let mut file = vec![0; 512];
        let mut page = vec![0; 512];
        page[300..304].copy_from_slice(&[0, 0, 0, 10]);
        page[304..310].copy_from_slice(b"secret");
        file.extend(page);
        let header = leaf_header(0, 300, 300);
        let freeblocks = [Freeblock {
            offset: 300,
            next: 0,
            size: 10,
        }];

        let regions = extract(file.as_slice(), 512, 512, &header, 8, &freeblocks).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].offset, 520);
        assert_eq!(regions[0].length, 292);
        assert_eq!(
            regions[1].source,
            SlackSource::Freeblock {
                offset: 300,
                size: 10
            }
        );
        assert_eq!(regions[1].offset, 816);
        assert_eq!(regions[1].raw, b"secret".to_vec());
        assert_eq!(regions[1].sanitized_text(), "secret");
    }

    #[test]
    fn test_extract_fixture() {
        let file = File::open("fixtures/deleted.db").unwrap();
        let (page, freeblocks) = decode_leaf(&file, 1024, 1024).unwrap();
        let regions = extract(
            &file,
            page.offset(),
            page.page_size(),
            page.header(),
            page.cell_pointer_array_end(),
            &freeblocks,
        )
        .unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].offset, 1024 + 14);
        assert_eq!(regions[0].length, 925);
        // A stale pointer left behind by the deleted cell.
        assert_eq!(regions[0].raw[..2], [0x03, 0xab]);
        assert_eq!(regions[0].sanitized, vec![0xab]);

        assert_eq!(regions[1].offset, 1024 + 977);
        assert_eq!(regions[1].length, 24);
        assert_eq!(regions[1].sanitized, b"%bravo secret\xc0".to_vec());
    }
}
