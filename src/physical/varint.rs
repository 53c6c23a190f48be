use std::io;

use crate::{
    error::{ForensicError, Result},
    physical::source::ReadAt,
};

pub const MAX_LEN: usize = 9;

/// Decodes a varint from the start of `bytes`, returning the value and the number of
/// bytes it occupied. Returns `None` if `bytes` ends before the varint does.
pub fn read(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut result = 0;

    for (i, &byte) in bytes.iter().enumerate().take(MAX_LEN) {
        if i == MAX_LEN - 1 {
            result <<= 8;
            result |= byte as u64;
            return Some((result, MAX_LEN));
        }

        result <<= 7;
        result |= (byte & 0x7f) as u64;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }

    None
}

/// Decodes the varint starting at `offset`, one byte at a time.
pub fn decode<R: ReadAt + ?Sized>(reader: &R, offset: u64) -> Result<(u64, usize)> {
    let mut bytes = [0; MAX_LEN];

    for i in 0..MAX_LEN {
        bytes[i] = match reader.read_u8(offset + i as u64) {
            Ok(byte) => byte,
            Err(ForensicError::Read { source, .. })
                if source.kind() == io::ErrorKind::UnexpectedEof =>
            {
                return Err(ForensicError::MalformedVarint { offset });
            }
            Err(err) => return Err(err),
        };

        if bytes[i] & 0x80 == 0 {
            break;
        }
    }

    read(&bytes).ok_or(ForensicError::MalformedVarint { offset })
}

/// Number of bytes `write` uses for `value`.
pub fn len(value: u64) -> usize {
    if value >> 56 != 0 {
        return MAX_LEN;
    }

    let mut len = 1;
    let mut rest = value >> 7;
    while rest != 0 {
        len += 1;
        rest >>= 7;
    }
    len
}

/// Encodes `value` with the fewest bytes possible and returns how many were written.
pub fn write(value: u64, bytes: &mut [u8]) -> usize {
    let len = len(value);

    if len == MAX_LEN {
        bytes[8] = value as u8;
        let mut rest = value >> 8;
        for i in (0..8).rev() {
            bytes[i] = (rest & 0x7f) as u8 | 0x80;
            rest >>= 7;
        }
    } else {
        for i in 0..len {
            let j = len - i - 1;

            if j == 0 {
                bytes[i] = (value & 0x7f) as u8;
            } else {
                bytes[i] = ((value >> (7 * j)) & 0x7f) as u8 | 0x80;
            }
        }
    }

    len
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_read_varint() {
        assert_eq!(read(&[0x00]), Some((0, 1)));
        assert_eq!(read(&[0x05]), Some((5, 1)));
        assert_eq!(read(&[0x81, 0x00]), Some((128, 2)));
        assert_eq!(read(&[0xff, 0x01]), Some((16257, 2)));
        assert_eq!(read(&[0x80, 0x40]), Some((64, 2)));
        assert_eq!(read(&[0xff; 9]), Some((u64::MAX, 9)));
        assert_eq!(
            read(&[0xd5, 0xaa, 0xd5, 0xaa, 0xd5, 0xaa, 0xd5, 0xaa, 0xaa]),
            Some((0xaaaa_aaaa_aaaa_aaaa, 9))
        );
    }

    #[test]
    fn test_read_ignores_trailing_bytes() {
        assert_eq!(read(&[0x17, 0x01, 0x02]), Some((23, 1)));
    }

    #[test]
    fn test_read_truncated() {
        assert_eq!(read(&[]), None);
        assert_eq!(read(&[0x81, 0x82]), None);
    }

    #[test]
    fn test_decode_at_offset() {
        let bytes: &[u8] = &[0xaa, 0xbb, 0x81, 0x00, 0x05];
        assert_eq!(decode(bytes, 2).unwrap(), (128, 2));
        assert_eq!(decode(bytes, 4).unwrap(), (5, 1));
    }

    #[test]
    fn test_decode_runs_off_end() {
        let bytes: &[u8] = &[0x00, 0x81, 0x82];
        let err = decode(bytes, 1).unwrap_err();
        assert!(matches!(err, ForensicError::MalformedVarint { offset: 1 }));
    }

    #[test]
    fn test_decode_stops_after_nine_bytes() {
        let mut bytes = vec![0xff; 9];
        bytes.extend_from_slice(&[0xff; 4]);
        assert_eq!(decode(bytes.as_slice(), 0).unwrap(), (u64::MAX, 9));
    }

    #[test]
    fn test_write_varint() {
        let mut bytes = [0; 9];

        assert_eq!(write(1, &mut bytes), 1);
        assert_eq!(&bytes[..1], [0x01]);

        assert_eq!(write(64, &mut bytes), 1);
        assert_eq!(&bytes[..1], [0x40]);

        assert_eq!(write(128, &mut bytes), 2);
        assert_eq!(&bytes[..2], [0x81, 0x00]);

        assert_eq!(write(16257, &mut bytes), 2);
        assert_eq!(&bytes[..2], [0xff, 0x01]);

        assert_eq!(write(0xaaaa_aaaa_aaaa_aaaa, &mut bytes), 9);
        assert_eq!(
            bytes,
            [0xd5, 0xaa, 0xd5, 0xaa, 0xd5, 0xaa, 0xd5, 0xaa, 0xaa]
        );
    }

    proptest! {
        #[test]
        fn prop_round_trip(value in 0u64..(1 << 56)) {
            let mut bytes = [0; 9];
            let written = write(value, &mut bytes);

            prop_assert!(written <= 8);
            prop_assert_eq!(read(&bytes[..written]), Some((value, written)));
            prop_assert_eq!(decode(&bytes[..written], 0).unwrap(), (value, written));
            if written > 1 {
                prop_assert!(value >= 1 << (7 * (written - 1)));
            }
        }

        #[test]
        fn prop_round_trip_nine_bytes(value in (1u64 << 56)..=u64::MAX) {
            let mut bytes = [0; 9];
            prop_assert_eq!(write(value, &mut bytes), 9);
            prop_assert_eq!(read(&bytes), Some((value, 9)));
        }
    }
}
