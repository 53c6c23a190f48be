use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{ForensicError, Result},
    physical::{btree::BTreePageType, header, source::ReadAt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PageCategory {
    InteriorIndex,
    InteriorTable,
    LeafIndex,
    LeafTable,
    /// A page whose type byte is 0: freelist pages, overflow pages and never-used space
    /// all look like this.
    Unallocated,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassifiedPage {
    pub offset: u64,
    pub flag: u8,
    pub category: PageCategory,
}

/// Every page of a file, labelled by its leading type byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageClassification {
    pub page_size: u32,
    pub pages: Vec<ClassifiedPage>,
}

impl PageCategory {
    pub fn from_flag(flag: u8) -> Self {
        match BTreePageType::from_flag(flag) {
            Some(BTreePageType::InteriorIndex) => PageCategory::InteriorIndex,
            Some(BTreePageType::InteriorTable) => PageCategory::InteriorTable,
            Some(BTreePageType::LeafIndex) => PageCategory::LeafIndex,
            Some(BTreePageType::LeafTable) => PageCategory::LeafTable,
            None if flag == 0 => PageCategory::Unallocated,
            None => PageCategory::Unknown,
        }
    }

    /// The character used for this category in [`PageClassification::map`].
    pub fn symbol(self) -> char {
        match self {
            PageCategory::InteriorIndex => 'I',
            PageCategory::InteriorTable => 'T',
            PageCategory::LeafIndex => 'i',
            PageCategory::LeafTable => 't',
            PageCategory::Unallocated => '0',
            PageCategory::Unknown => '?',
        }
    }
}

/// Reads the type byte of every page in the file. A trailing partial page is
/// classified like any other as long as its type byte is present.
pub fn classify<R: ReadAt + ?Sized>(
    reader: &R,
    file_size: u64,
    page_size: u32,
) -> Result<PageClassification> {
    if page_size == 0 {
        return Err(ForensicError::MalformedPage {
            page_offset: 0,
            reason: "page size is zero",
        });
    }

    let mut pages = Vec::new();
    let mut offset = 0;
    while offset < file_size {
        let flag_offset = offset + header::reserved(offset) as u64;
        if flag_offset >= file_size {
            break;
        }

        let flag = reader.read_u8(flag_offset)?;
        let category = PageCategory::from_flag(flag);
        if category == PageCategory::Unknown {
            warn!(offset, flag, "unknown page type");
        }
        pages.push(ClassifiedPage {
            offset,
            flag,
            category,
        });

        offset += page_size as u64;
    }

    debug!(pages = pages.len(), page_size, "classified pages");
    Ok(PageClassification { page_size, pages })
}

impl PageClassification {
    pub fn offsets(&self, category: PageCategory) -> impl Iterator<Item = u64> + '_ {
        self.pages
            .iter()
            .filter(move |page| page.category == category)
            .map(|page| page.offset)
    }

    pub fn counts(&self) -> BTreeMap<PageCategory, usize> {
        let mut counts = BTreeMap::new();
        for page in &self.pages {
            *counts.entry(page.category).or_default() += 1;
        }
        counts
    }

    /// One character per page, in file order.
    pub fn map(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.category.symbol())
            .collect()
    }

    /// The pages with unrecognised type bytes, as errors.
    pub fn unknown(&self) -> Vec<ForensicError> {
        self.pages
            .iter()
            .filter(|page| page.category == PageCategory::Unknown)
            .map(|page| ForensicError::UnknownPageType {
                offset: page.offset,
                flag: page.flag,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use super::*;

    fn image(flags: &[u8]) -> Vec<u8> {
        let mut file = vec![0; flags.len() * 512];
        for (i, &flag) in flags.iter().enumerate() {
            let offset = i * 512 + header::reserved((i * 512) as u64);
            file[offset] = flag;
        }
        file
    }

    #[test]
    fn test_classify() {
        let file = image(&[13, 2, 200, 5, 0, 10, 13]);
        let classification = classify(file.as_slice(), file.len() as u64, 512).unwrap();

        assert_eq!(classification.pages.len(), 7);
        assert_eq!(classification.map(), "tI?T0it");
        assert_eq!(
            classification
                .offsets(PageCategory::LeafTable)
                .collect::<Vec<_>>(),
            vec![0, 3072]
        );
        assert_eq!(classification.pages[2].flag, 200);

        let counts = classification.counts();
        assert_eq!(counts[&PageCategory::LeafTable], 2);
        assert_eq!(counts[&PageCategory::Unknown], 1);
        assert_eq!(counts.get(&PageCategory::InteriorTable), Some(&1));

        let unknown = classification.unknown();
        assert_eq!(unknown.len(), 1);
        assert!(matches!(
            unknown[0],
            ForensicError::UnknownPageType {
                offset: 1024,
                flag: 200
            }
        ));
    }

    #[test]
    fn test_first_page_flag_after_header() {
        let mut file = image(&[13, 13]);
        file[0] = b'S';
        let classification = classify(file.as_slice(), file.len() as u64, 512).unwrap();
        assert_eq!(classification.map(), "tt");
    }

    #[test]
    fn test_partial_last_page() {
        let mut file = image(&[13, 13]);
        file.truncate(600);
        let classification = classify(file.as_slice(), file.len() as u64, 512).unwrap();
        assert_eq!(classification.map(), "tt");
    }

    #[test]
    fn test_zero_page_size() {
        let file = image(&[13]);
        assert!(classify(file.as_slice(), file.len() as u64, 0).is_err());
    }

    #[test]
    fn test_classify_fixture() {
        let file = File::open("fixtures/deleted.db").unwrap();
        let classification = classify(&file, 2048, 1024).unwrap();
        assert_eq!(classification.map(), "tt");
        assert_eq!(
            classification
                .offsets(PageCategory::LeafTable)
                .collect::<Vec<_>>(),
            vec![0, 1024]
        );
    }
}
