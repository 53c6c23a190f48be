use std::fmt::Display;

use serde::Serialize;

use super::DatabaseHeader;

/// The database header rendered for an examiner: one entry per field, in file order,
/// holding both the raw value and its interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedHeader {
    pub fields: Vec<HeaderField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderField {
    pub key: &'static str,
    pub label: &'static str,
    pub raw: String,
    pub translated: String,
}

const LEGACY: &str = "Legacy - Roll Back Journalling";
const WAL: &str = "WAL - Write Ahead Log Journalling";

impl TranslatedHeader {
    pub(super) fn new(header: &DatabaseHeader) -> Self {
        let mut fields = Fields::default();

        let signature = header.signature().escape_ascii().to_string();
        let translated = if header.check_signature() {
            signature.clone()
        } else {
            "Invalid Signature".to_owned()
        };
        fields.push("sig", "Signature", signature, translated);

        let page_size = header.page_size.get();
        let translated = match page_size {
            1 => "65536".to_owned(),
            n => n.to_string(),
        };
        fields.push("pagesize", "Page Size", page_size, translated);

        let (read, write) = translate_versions(header.read_version, header.write_version);
        fields.push("readver", "Read Format", header.read_version, read);
        fields.push("writever", "Write Format", header.write_version, write);

        fields.push_raw("resspace", "Reserved Bytes Per Page", header.reserved_space);

        let (max, min, leaf) = header.payload_fractions();
        fields.push("maxpayload", "Max Payload Fraction", max, require(max, 64));
        fields.push("minpayload", "Min Payload Fraction", min, require(min, 32));
        fields.push("leafpayload", "Leaf Payload Fraction", leaf, require(leaf, 32));

        let change_counter = header.file_change_counter();
        let mut translated = change_counter.to_string();
        if header.is_wal() {
            translated.push_str(" (WAL enabled - value may be inaccurate.)");
        }
        fields.push("changecount", "File Change Count", change_counter, translated);

        let database_size = header.database_size();
        let translated =
            if change_counter == header.version_valid_for() && database_size > 0 {
                format!("{database_size} page(s)")
            } else {
                invalid(database_size)
            };
        fields.push("dbsize", "In-header DB Size", database_size, translated);

        fields.push_raw(
            "freepagelist",
            "Free Page List starting page",
            header.freelist_head(),
        );
        fields.push_raw("totalfreelist", "Total Free Pages", header.freelist_count());
        fields.push_raw("schemacookie", "Schema Cookie", header.schema_cookie());

        let schema_format = header.schema_format();
        let translated = match schema_format {
            1 => "1 - SQLite 3.0.0+ Compatible".to_owned(),
            2 => "2 - SQLite 3.1.3+ Compatible".to_owned(),
            3 => "3 - SQLite 3.1.4+ Compatible".to_owned(),
            4 => "4 - SQLite 3.3.0+ Compatible".to_owned(),
            n => invalid(n),
        };
        fields.push("schemanum", "Schema Format number", schema_format, translated);

        fields.push_raw(
            "defpagecache",
            "Suggested cache size",
            header.default_cache_size(),
        );

        let largest_root_page = header.largest_root_page();
        let incremental_vacuum = header.incremental_vacuum();
        let (root, vacuum) = if largest_root_page == 0 {
            let vacuum = if incremental_vacuum == 0 {
                "0 - auto_vacuum mode".to_owned()
            } else {
                format!("Invalid mode: {incremental_vacuum}")
            };
            ("0 - ptrmap pages disabled".to_owned(), vacuum)
        } else {
            (
                largest_root_page.to_string(),
                format!("{incremental_vacuum} - incremental_vacuum mode"),
            )
        };
        fields.push("bigroottree", "Largest Root Page Number", largest_root_page, root);

        let encoding = header.text_encoding_raw();
        let translated = match encoding {
            1 => "UTF-8".to_owned(),
            2 => "UTF-16LE".to_owned(),
            3 => "UTF-16BE".to_owned(),
            n => format!("Invalid Encoding: {n}"),
        };
        fields.push("textencode", "Text Encoding", encoding, translated);

        fields.push_raw("userver", "User Version", header.user_version());
        fields.push("incvac", "Vacuum Settings", incremental_vacuum, vacuum);

        let expansion = hex(header.expansion());
        fields.push("expansion", "Expansion block", expansion.clone(), expansion);

        fields.push_raw(
            "validfor",
            "Valid-For Version",
            header.version_valid_for(),
        );

        let version = header.sqlite_version();
        let translated = format!(
            "{}.{}.{}",
            version / 1_000_000,
            version / 1_000 % 1_000,
            version % 1_000
        );
        fields.push("sqlver", "Last SQLite Version", version, translated);

        Self { fields: fields.0 }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderField> {
        self.fields.iter().find(|field| field.key == key)
    }
}

#[derive(Default)]
struct Fields(Vec<HeaderField>);

impl Fields {
    fn push(
        &mut self,
        key: &'static str,
        label: &'static str,
        raw: impl Display,
        translated: String,
    ) {
        self.0.push(HeaderField {
            key,
            label,
            raw: raw.to_string(),
            translated,
        });
    }

    fn push_raw(&mut self, key: &'static str, label: &'static str, raw: impl Display) {
        let raw = raw.to_string();
        self.push(key, label, raw.clone(), raw);
    }
}

fn translate_versions(read: u8, write: u8) -> (String, String) {
    let mode = |version: u8| (if version == 1 { LEGACY } else { WAL }).to_owned();

    match (read, write) {
        (1 | 2, 3..) => (mode(read), "READ-ONLY".to_owned()),
        (3.., _) => ("Read and Write Disabled.".to_owned(), mode(write)),
        (1 | 2, 1 | 2) => (mode(read), mode(write)),
        _ => (invalid(read), invalid(write)),
    }
}

fn require(value: u8, expected: u8) -> String {
    if value == expected {
        value.to_string()
    } else {
        invalid(value)
    }
}

fn invalid(value: impl Display) -> String {
    format!("Invalid value: {value}")
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
