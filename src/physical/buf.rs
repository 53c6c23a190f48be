use std::mem;

use crate::physical::varint;

/// Cursor-style consumption of an in-memory byte slice. Every method leaves the
/// slice untouched when there are not enough bytes left.
pub trait Buf<'a> {
    fn consume_bytes(&mut self, count: usize) -> Option<&'a [u8]>;

    fn consume_varint(&mut self) -> Option<u64>;

    fn consume<T: zerocopy::FromBytes>(&mut self) -> Option<T> {
        let bytes = self.consume_bytes(mem::size_of::<T>())?;
        T::read_from(bytes)
    }
}

impl<'a> Buf<'a> for &'a [u8] {
    fn consume_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        let bytes: &'a [u8] = *self;
        if count > bytes.len() {
            return None;
        }

        let (result, rest) = bytes.split_at(count);
        *self = rest;
        Some(result)
    }

    fn consume_varint(&mut self) -> Option<u64> {
        let bytes: &'a [u8] = *self;
        let (result, len) = varint::read(bytes)?;
        *self = &bytes[len..];
        Some(result)
    }
}
