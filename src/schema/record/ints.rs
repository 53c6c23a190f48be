use std::fmt;

/// A big-endian, two's complement 24-bit integer as stored in a record body.
#[derive(Clone, Copy, PartialEq, Eq, zerocopy::FromZeroes, zerocopy::FromBytes, zerocopy::Unaligned)]
#[repr(transparent)]
pub struct I24([u8; 3]);

/// A big-endian, two's complement 48-bit integer as stored in a record body.
#[derive(Clone, Copy, PartialEq, Eq, zerocopy::FromZeroes, zerocopy::FromBytes, zerocopy::Unaligned)]
#[repr(transparent)]
pub struct I48([u8; 6]);

fn sign_extend<const N: usize>(bytes: [u8; N]) -> i64 {
    let fill = if bytes[0] & 0x80 == 0 { 0x00 } else { 0xff };
    let mut wide = [fill; 8];
    wide[8 - N..].copy_from_slice(&bytes);
    i64::from_be_bytes(wide)
}

impl I24 {
    pub fn get(self) -> i64 {
        sign_extend(self.0)
    }
}

impl I48 {
    pub fn get(self) -> i64 {
        sign_extend(self.0)
    }
}

impl fmt::Debug for I24 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("I24").field(&self.get()).finish()
    }
}

impl fmt::Debug for I48 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("I48").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use zerocopy::FromBytes;

    use super::*;

    #[test]
    fn test_i24() {
        let read = |bytes: &[u8]| I24::read_from(bytes).unwrap().get();
        assert_eq!(read(&[0x01, 0x11, 0x70]), 70000);
        assert_eq!(read(&[0xff, 0xff, 0xff]), -1);
        assert_eq!(read(&[0x80, 0x00, 0x00]), -(1 << 23));
    }

    #[test]
    fn test_i48() {
        let read = |bytes: &[u8]| I48::read_from(bytes).unwrap().get();
        assert_eq!(read(&[0x00, 0x00, 0x00, 0x01, 0x00, 0x00]), 65536);
        assert_eq!(read(&[0xff; 6]), -1);
        assert_eq!(read(&[0x7f, 0xff, 0xff, 0xff, 0xff, 0xff]), (1 << 47) - 1);
    }
}
