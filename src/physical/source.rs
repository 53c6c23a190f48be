use std::{fs::File, io};

use crate::error::{ForensicError, Result};

/// Positioned, read-only access to the bytes of a database file.
///
/// Every decoder takes an explicit offset, so there is no shared cursor and one
/// source can be read from several places at once.
pub trait ReadAt {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    fn size(&self) -> io::Result<u64>;

    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read_exact_at(&mut buf, offset)
            .map_err(|source| ForensicError::Read {
                offset,
                len,
                source,
            })?;
        Ok(buf)
    }

    fn read_u8(&self, offset: u64) -> Result<u8> {
        let mut buf = [0; 1];
        self.read_exact_at(&mut buf, offset)
            .map_err(|source| ForensicError::Read {
                offset,
                len: 1,
                source,
            })?;
        Ok(buf[0])
    }
}

impl ReadAt for File {
    #[cfg(unix)]
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;

        while !buf.is_empty() {
            match self.seek_read(buf, offset) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl ReadAt for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| io::ErrorKind::UnexpectedEof)?;
        let bytes = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or(io::ErrorKind::UnexpectedEof)?;
        buf.copy_from_slice(bytes);
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl ReadAt for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.as_slice().read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        self.as_slice().size()
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_exact_at(buf, offset)
    }

    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_slice() {
        let bytes: &[u8] = &[1, 2, 3, 4];
        assert_eq!(bytes.read_bytes(1, 2).unwrap(), vec![2, 3]);
        assert_eq!(bytes.read_u8(3).unwrap(), 4);
        assert_eq!(bytes.size().unwrap(), 4);
    }

    #[test]
    fn test_read_past_end() {
        let bytes: &[u8] = &[1, 2, 3, 4];
        let err = bytes.read_bytes(3, 2).unwrap_err();
        assert!(matches!(
            err,
            ForensicError::Read {
                offset: 3,
                len: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_read_file() {
        let file = File::open("fixtures/empty.db").unwrap();
        assert_eq!(file.size().unwrap(), 8192);
        assert_eq!(file.read_bytes(0, 6).unwrap(), b"SQLite");
    }
}
