use std::{fmt, fs::File, path::Path};

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::{
    error::{ForensicError, Result},
    options::AnalysisOptions,
    physical::{
        btree::{freeblock, BTreePage, BTreePageType, Freeblock, PageHeader},
        header::DatabaseHeader,
        scan::{self, PageCategory, PageClassification},
        slack::{self, SlackRegion, SlackSource},
        source::ReadAt,
    },
    schema::record::{self, RecordContext, Row},
};

/// A decoding session over one database file. Holds the reader and the validated
/// header; everything else is decoded on demand.
pub struct Database<R = File> {
    reader: R,
    header: DatabaseHeader,
    file_size: u64,
}

/// Everything recovered from one leaf-table page. Failures are kept alongside whatever
/// could still be decoded.
#[derive(Debug, Serialize)]
pub struct PageReport {
    pub offset: u64,
    pub header: Option<PageHeader>,
    pub cell_pointers: Vec<u16>,
    pub freeblocks: Vec<Freeblock>,
    pub rows: Vec<Row>,
    pub slack: Vec<SlackRegion>,
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<ForensicError>,
}

#[derive(Debug, Serialize)]
pub struct Analysis {
    pub classification: PageClassification,
    pub pages: Vec<PageReport>,
}

fn serialize_failures<S: Serializer>(
    failures: &[ForensicError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(failures.iter().map(|failure| failure.to_string()))
}

impl Database<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ForensicError::FileOpen {
            path: path.to_owned(),
            source,
        })?;
        Self::from_reader(file)
    }
}

impl<R: ReadAt> Database<R> {
    /// Reads and validates the database header. Nothing past the header is trusted
    /// unless the signature matches.
    pub fn from_reader(reader: R) -> Result<Self> {
        let header = DatabaseHeader::decode(&reader)?;
        if !header.check_signature() {
            return Err(ForensicError::SignatureMismatch {
                found: header.signature(),
            });
        }

        let file_size = reader.size().map_err(|source| ForensicError::Read {
            offset: 0,
            len: 0,
            source,
        })?;

        info!(
            file_size,
            page_size = header.page_size(),
            wal = header.is_wal(),
            "opened database"
        );

        Ok(Self {
            reader,
            header,
            file_size,
        })
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn header(&self) -> &DatabaseHeader {
        &self.header
    }

    pub fn page_size(&self) -> u32 {
        self.header.page_size()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Offset of the 1-based page `page_number`.
    pub fn page_offset(&self, page_number: u32) -> u64 {
        page_number.saturating_sub(1) as u64 * self.page_size() as u64
    }

    pub fn record_context(&self) -> RecordContext {
        RecordContext::from(&self.header)
    }

    pub fn classify(&self) -> Result<PageClassification> {
        scan::classify(&self.reader, self.file_size, self.page_size())
    }

    pub fn page(&self, offset: u64) -> Result<BTreePage> {
        BTreePage::decode(&self.reader, offset, self.page_size())
    }

    pub fn analyze(&self, options: &AnalysisOptions) -> Result<Analysis> {
        let classification = self.classify()?;
        let pages = classification
            .offsets(PageCategory::LeafTable)
            .map(|offset| self.analyze_page(offset, options))
            .collect::<Vec<_>>();

        let failures = pages.iter().map(|page| page.failures.len()).sum::<usize>();
        info!(pages = pages.len(), failures, "analysis finished");

        Ok(Analysis {
            classification,
            pages,
        })
    }

    /// Decodes the page at `offset` as far as it goes.
    pub fn analyze_page(&self, offset: u64, options: &AnalysisOptions) -> PageReport {
        let mut report = PageReport {
            offset,
            header: None,
            cell_pointers: Vec::new(),
            freeblocks: Vec::new(),
            rows: Vec::new(),
            slack: Vec::new(),
            failures: Vec::new(),
        };

        let page = match self.page(offset) {
            Ok(page) => page,
            Err(err) => {
                warn!(offset, %err, "skipping page");
                report.failures.push(err);
                return report;
            }
        };
        report.header = Some(page.header().clone());
        report.cell_pointers = page.cell_pointers().to_vec();

        let limit = options
            .max_freeblocks
            .unwrap_or_else(|| freeblock::default_limit(self.page_size()));
        let freeblocks = match page.freeblocks_with_limit(&self.reader, limit) {
            Ok(freeblocks) => Some(freeblocks),
            Err(err) => {
                report.failures.push(err);
                None
            }
        };

        if options.decode_rows && page.page_type() == BTreePageType::LeafTable {
            self.decode_rows(&page, &mut report);
        }

        // No slack at all when the free-block chain is corrupt.
        if let Some(freeblocks) = freeblocks.as_ref().filter(|_| options.extract_slack) {
            if page.header().content_area_offset() > self.page_size() {
                report.failures.push(ForensicError::MalformedPage {
                    page_offset: offset,
                    reason: "cell content area starts past the end of the page",
                });
            }
            match slack::extract(
                &self.reader,
                offset,
                self.page_size(),
                page.header(),
                page.cell_pointer_array_end(),
                freeblocks,
            ) {
                Ok(mut regions) => {
                    if !options.keep_empty_gap {
                        regions.retain(|region| {
                            region.source != SlackSource::Gap || !region.is_empty()
                        });
                    }
                    report.slack = regions;
                }
                Err(err) => report.failures.push(err),
            }
        }
        report.freeblocks = freeblocks.unwrap_or_default();

        debug!(
            offset,
            rows = report.rows.len(),
            slack = report.slack.len(),
            failures = report.failures.len(),
            "analyzed page"
        );
        report
    }

    fn decode_rows(&self, page: &BTreePage, report: &mut PageReport) {
        let ctx = self.record_context();
        for (&pointer, cell_offset) in page.cell_pointers().iter().zip(page.cell_offsets()) {
            if pointer as u32 >= self.page_size() {
                report.failures.push(ForensicError::MalformedRecord {
                    cell_offset,
                    reason: "cell pointer points outside the page",
                });
                continue;
            }

            match record::decode_cell(&self.reader, cell_offset, &ctx) {
                Ok(row) => {
                    report.failures.extend(row.anomalies());
                    report.rows.push(row);
                }
                Err(err) => {
                    warn!(cell_offset, %err, "skipping cell");
                    report.failures.push(err);
                }
            }
        }
    }
}

impl<R> fmt::Debug for Database<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("page_size", &self.header.page_size())
            .field("file_size", &self.file_size)
            .finish()
    }
}
