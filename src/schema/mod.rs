use anyhow::{anyhow, bail, Context, Result};
use serde::{de::IntoDeserializer, Deserialize, Serialize};
use tracing::debug;

use crate::physical::{btree::BTreePageType, db::Database, source::ReadAt};

use self::record::decode_cell;

pub mod record;
pub mod serialization;

/// One row of the `sqlite_schema` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaObject {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    pub name: String,
    pub tbl_name: String,
    pub rootpage: i64,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Table,
    Index,
    View,
    Trigger,
}

/// Source of schema and row-count facts. Anything beyond what can be read from
/// single pages needs a query engine behind this trait.
pub trait Catalog {
    fn objects(&self) -> Result<Vec<SchemaObject>>;

    /// Rows in the table or view called `name`. `None` when the count cannot be
    /// determined.
    fn row_count(&self, name: &str) -> Result<Option<u64>>;
}

/// Schema objects grouped by kind, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub tables: Vec<SchemaObject>,
    pub indexes: Vec<SchemaObject>,
    pub triggers: Vec<SchemaObject>,
    pub views: Vec<SchemaObject>,
}

impl CatalogSummary {
    pub fn group(objects: impl IntoIterator<Item = SchemaObject>) -> Self {
        let mut summary = Self::default();
        for object in objects {
            let group = match object.kind {
                SchemaType::Table => &mut summary.tables,
                SchemaType::Index => &mut summary.indexes,
                SchemaType::Trigger => &mut summary.triggers,
                SchemaType::View => &mut summary.views,
            };
            group.push(object);
        }
        summary
    }
}

/// Reads the schema straight from page 1. Only works while the schema fits on that
/// one leaf page.
pub struct PageOneCatalog<'db, R> {
    db: &'db Database<R>,
}

impl<'db, R: ReadAt> PageOneCatalog<'db, R> {
    pub fn new(db: &'db Database<R>) -> Self {
        Self { db }
    }
}

impl<'db, R: ReadAt> Catalog for PageOneCatalog<'db, R> {
    fn objects(&self) -> Result<Vec<SchemaObject>> {
        let page = self.db.page(0)?;
        if page.page_type() != BTreePageType::LeafTable {
            bail!("schema spans several pages and needs a query engine to enumerate");
        }

        let ctx = self.db.record_context();
        let objects = page
            .cell_offsets()
            .map(|cell_offset| {
                let row = decode_cell(self.db.reader(), cell_offset, &ctx)?;
                SchemaObject::deserialize(row.into_deserializer())
                    .with_context(|| format!("schema row at offset {cell_offset}"))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(objects = objects.len(), "read schema from page 1");
        Ok(objects)
    }

    fn row_count(&self, name: &str) -> Result<Option<u64>> {
        let rootpage = self
            .objects()?
            .into_iter()
            .find(|object| {
                matches!(object.kind, SchemaType::Table | SchemaType::View) && object.name == name
            })
            .map(|object| object.rootpage)
            .ok_or_else(|| anyhow!("table or view {name} not found in schema"))?;

        // Views have no storage of their own; counting them needs a query engine.

        let Ok(page_number) = u32::try_from(rootpage) else {
            return Ok(None);
        };
        if page_number == 0 {
            return Ok(None);
        }

        let page = self.db.page(self.db.page_offset(page_number))?;
        Ok(match page.page_type() {
            BTreePageType::LeafTable => Some(page.cell_count() as u64),
            _ => None,
        })
    }
}

impl<R: ReadAt> Database<R> {
    pub fn catalog(&self) -> PageOneCatalog<'_, R> {
        PageOneCatalog::new(self)
    }
}
