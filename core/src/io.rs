// Positional I/O seams for image sources and sinks.
// Readers may issue reads in any order; writers emit sectors out of order,
// so a forward-only sink cannot back an image write.

use std::cell::RefCell;
use std::fs::File;
use std::io;

/// A random-access byte source. The implementor is borrowed, never closed.
pub trait ReadAt {
    /// Fill `buf` starting at byte `offset`, returning the number of bytes
    /// read. A short count past end-of-source is not an error here.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Fill all of `buf` or fail with `UnexpectedEof`.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "source ended before the requested range",
                ));
            }
            filled += n;
        }
        Ok(())
    }
}

/// A positionally writable byte sink. Writes may arrive at arbitrary
/// offsets; the sink is never read back.
pub trait WriteAt {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

impl<T: WriteAt + ?Sized> WriteAt for &T {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        (**self).write_at(buf, offset)
    }
}

#[cfg(unix)]
impl ReadAt for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

#[cfg(unix)]
impl WriteAt for File {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::write_all_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl ReadAt for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

#[cfg(windows)]
impl WriteAt for File {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = std::os::windows::fs::FileExt::seek_write(
                self,
                &buf[written..],
                offset + written as u64,
            )?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            written += n;
        }
        Ok(())
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let available = &self[offset as usize..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

/// In-memory sink. Grows on writes past the current end, the same way a
/// sparse image file would.
impl WriteAt for RefCell<Vec<u8>> {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut inner = self.borrow_mut();
        let end = offset as usize + buf.len();
        if inner.len() < end {
            inner.resize(end, 0);
        }
        inner[offset as usize..end].copy_from_slice(buf);
        Ok(())
    }
}

impl ReadAt for RefCell<Vec<u8>> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.borrow().as_slice().read_at(buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_read_at_short_tail() {
        let data = [1u8, 2, 3, 4, 5];
        let mut buf = [0u8; 4];
        assert_eq!(data.read_at(&mut buf, 3).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(data.read_at(&mut buf, 9).unwrap(), 0);
    }

    #[test]
    fn read_exact_at_fails_past_end() {
        let data = [0u8; 8];
        let mut buf = [0u8; 4];
        assert!(data.read_exact_at(&mut buf, 6).is_err());
    }

    #[test]
    fn refcell_sink_grows() {
        let sink = RefCell::new(Vec::new());
        sink.write_at(b"abc", 4).unwrap();
        sink.write_at(b"xy", 0).unwrap();
        assert_eq!(&*sink.borrow(), &[b'x', b'y', 0, 0, b'a', b'b', b'c']);
    }
}
