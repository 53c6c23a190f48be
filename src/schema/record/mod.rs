use serde::Serialize;
use tracing::{debug, warn};
use zerocopy::big_endian::{F64, I16, I32, I64};

use crate::{
    error::{ForensicError, Result},
    physical::{
        buf::Buf,
        header::{DatabaseHeader, TextEncoding},
        source::ReadAt,
        varint,
    },
};

use self::ints::{I24, I48};

pub mod ints;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SerialType {
    Null,
    I8,
    I16,
    I24,
    I32,
    I48,
    I64,
    F64,
    Zero,
    One,
    /// Codes 10 and 11, reserved for internal use.
    Reserved(u64),
    Blob(u64),
    Text(u64),
}

/// A single decoded field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    /// Serial types 8 and 9, which store 0 and 1 without a body.
    IntegerConstant(i64),
    Blob(Vec<u8>),
    Text(String),
    Reserved(u64),
    /// The field's bytes live on an overflow page.
    Overflow(SerialType),
    /// The field's bytes lie past the end of the declared payload or the file.
    Truncated(SerialType),
}

/// The header facts record decoding depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordContext {
    /// `None` when the header declares an encoding other than 1, 2 or 3. Text is then
    /// read as UTF-8.
    pub text_encoding: Option<TextEncoding>,
    pub usable_size: u32,
}

/// The parsed prefix of a table-leaf cell: everything up to the record body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellHeader {
    pub cell_offset: u64,
    pub payload_length: u64,
    pub row_id: i64,
    pub header_length: u64,
    pub serial_types: Vec<SerialType>,
    /// Absolute offset of the first payload byte (the record header length varint).
    pub payload_start: u64,
    /// How much of the payload is stored on this page.
    pub local_payload_length: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub cell_offset: u64,
    pub row_id: i64,
    pub values: Vec<Value>,
}

impl From<u64> for SerialType {
    fn from(value: u64) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::I8,
            2 => Self::I16,
            3 => Self::I24,
            4 => Self::I32,
            5 => Self::I48,
            6 => Self::I64,
            7 => Self::F64,
            8 => Self::Zero,
            9 => Self::One,
            10 | 11 => Self::Reserved(value),
            n if n % 2 == 0 => Self::Blob((n - 12) / 2),
            n => Self::Text((n - 13) / 2),
        }
    }
}

impl SerialType {
    /// Number of body bytes a field of this type occupies.
    pub fn width(self) -> u64 {
        match self {
            Self::Null | Self::Zero | Self::One | Self::Reserved(_) => 0,
            Self::I8 => 1,
            Self::I16 => 2,
            Self::I24 => 3,
            Self::I32 => 4,
            Self::I48 => 6,
            Self::I64 | Self::F64 => 8,
            Self::Blob(n) | Self::Text(n) => n,
        }
    }

    pub fn code(self) -> u64 {
        match self {
            Self::Null => 0,
            Self::I8 => 1,
            Self::I16 => 2,
            Self::I24 => 3,
            Self::I32 => 4,
            Self::I48 => 5,
            Self::I64 => 6,
            Self::F64 => 7,
            Self::Zero => 8,
            Self::One => 9,
            Self::Reserved(code) => code,
            Self::Blob(n) => n * 2 + 12,
            Self::Text(n) => n * 2 + 13,
        }
    }
}

impl From<&DatabaseHeader> for RecordContext {
    fn from(header: &DatabaseHeader) -> Self {
        Self {
            text_encoding: header.text_encoding(),
            usable_size: header.usable_size(),
        }
    }
}

impl RecordContext {
    /// Bytes of a payload of `payload_length` bytes that stay on the leaf page.
    pub fn local_payload_length(&self, payload_length: u64) -> u64 {
        let usable = self.usable_size as u64;
        let max_local = usable.saturating_sub(35);
        if payload_length <= max_local {
            return payload_length;
        }

        let min_local = ((usable.saturating_sub(12)) * 32 / 255).saturating_sub(23);
        let spill = usable.saturating_sub(4).max(1);
        let local = min_local + (payload_length - min_local) % spill;
        if local <= max_local {
            local
        } else {
            min_local
        }
    }

    fn decode_text(&self, bytes: &[u8]) -> String {
        let utf16 = |to_u16: fn([u8; 2]) -> u16| -> String {
            let units = bytes
                .chunks_exact(2)
                .map(|pair| to_u16([pair[0], pair[1]]));
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        };

        match self.text_encoding {
            Some(TextEncoding::Utf16Le) => utf16(u16::from_le_bytes),
            Some(TextEncoding::Utf16Be) => utf16(u16::from_be_bytes),
            Some(TextEncoding::Utf8) | None => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Parses the payload length, row id and record header of the table-leaf cell at
/// `cell_offset`.
pub fn decode_cell_header<R: ReadAt + ?Sized>(
    reader: &R,
    cell_offset: u64,
    ctx: &RecordContext,
) -> Result<CellHeader> {
    let malformed = |reason: &'static str| ForensicError::MalformedRecord {
        cell_offset,
        reason,
    };

    let (payload_length, len) = varint::decode(reader, cell_offset)?;
    let mut offset = cell_offset + len as u64;
    let (row_id, len) = varint::decode(reader, offset)?;
    offset += len as u64;
    let payload_start = offset;

    let (header_length, len) = varint::decode(reader, payload_start)?;
    let local_payload_length = ctx.local_payload_length(payload_length);
    if header_length > payload_length {
        return Err(malformed("record header is longer than the payload"));
    }
    if header_length > local_payload_length {
        return Err(malformed("record header spills onto an overflow page"));
    }
    if (header_length as usize) < len {
        return Err(malformed("record header is shorter than its own length"));
    }

    let bytes = reader.read_bytes(payload_start, header_length as usize)?;
    let mut data = &bytes[len..];
    let mut serial_types = Vec::new();
    while !data.is_empty() {
        let code = data
            .consume_varint()
            .ok_or_else(|| malformed("serial type runs past the record header"))?;
        serial_types.push(SerialType::from(code));
    }

    Ok(CellHeader {
        cell_offset,
        payload_length,
        row_id: row_id as i64,
        header_length,
        serial_types,
        payload_start,
        local_payload_length,
    })
}

/// Decodes the table-leaf cell at `cell_offset` into a row. Fields that cannot be read
/// are replaced by placeholders rather than dropping the row.
pub fn decode_cell<R: ReadAt + ?Sized>(
    reader: &R,
    cell_offset: u64,
    ctx: &RecordContext,
) -> Result<Row> {
    let header = decode_cell_header(reader, cell_offset, ctx)?;

    let file_size = reader.size().map_err(|source| ForensicError::Read {
        offset: header.payload_start,
        len: header.local_payload_length as usize,
        source,
    })?;
    let available = file_size
        .saturating_sub(header.payload_start)
        .min(header.local_payload_length);
    let local = reader.read_bytes(header.payload_start, available as usize)?;

    let mut position = header.header_length;
    let mut values = Vec::with_capacity(header.serial_types.len());
    for &ty in &header.serial_types {
        let value = match position.checked_add(ty.width()) {
            _ if ty.width() == 0 => decode_value(ty, &[], ctx),
            Some(end) if end <= header.payload_length => {
                let value = if end > header.local_payload_length {
                    Value::Overflow(ty)
                } else if end > available {
                    Value::Truncated(ty)
                } else {
                    decode_value(ty, &local[position as usize..end as usize], ctx)
                };
                position = end;
                value
            }
            // Runs past the declared payload; nothing after it can be located.
            _ => {
                position = header.payload_length;
                Value::Truncated(ty)
            }
        };

        if let Value::Reserved(code) = value {
            warn!(cell_offset, code, "reserved serial type");
        }
        values.push(value);
    }

    debug!(cell_offset, row_id = header.row_id, fields = values.len(), "decoded cell");

    Ok(Row {
        cell_offset,
        row_id: header.row_id,
        values,
    })
}

fn decode_value(ty: SerialType, mut data: &[u8], ctx: &RecordContext) -> Value {
    let value = match ty {
        SerialType::Null => Some(Value::Null),
        SerialType::I8 => data.consume::<i8>().map(|v| Value::Integer(v as i64)),
        SerialType::I16 => data.consume::<I16>().map(|v| Value::Integer(v.get() as i64)),
        SerialType::I24 => data.consume::<I24>().map(|v| Value::Integer(v.get())),
        SerialType::I32 => data.consume::<I32>().map(|v| Value::Integer(v.get() as i64)),
        SerialType::I48 => data.consume::<I48>().map(|v| Value::Integer(v.get())),
        SerialType::I64 => data.consume::<I64>().map(|v| Value::Integer(v.get())),
        SerialType::F64 => data.consume::<F64>().map(|v| Value::Float(v.get())),
        SerialType::Zero => Some(Value::IntegerConstant(0)),
        SerialType::One => Some(Value::IntegerConstant(1)),
        SerialType::Reserved(code) => Some(Value::Reserved(code)),
        SerialType::Blob(_) => Some(Value::Blob(data.to_vec())),
        SerialType::Text(_) => Some(Value::Text(ctx.decode_text(data))),
    };
    value.unwrap_or(Value::Truncated(ty))
}

impl Row {
    /// Problems found while decoding that did not stop the row from being produced.
    pub fn anomalies(&self) -> Vec<ForensicError> {
        self.values
            .iter()
            .filter_map(|value| match *value {
                Value::Reserved(code) => Some(ForensicError::ReservedSerialType {
                    cell_offset: self.cell_offset,
                    code,
                }),
                _ => None,
            })
            .collect()
    }
}
