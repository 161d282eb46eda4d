//! Storage seam: seekable inputs and the opener that produces them.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// A random-access byte source.
///
/// Closing is dropping; the container reader holds its input in an `Option`
/// so that `close()` can release it early and stay idempotent.
pub trait SeekableInput: Read + Seek {
    /// Total length in bytes.
    fn length(&mut self) -> io::Result<u64> {
        let here = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if here != end {
            self.seek(SeekFrom::Start(here))?;
        }
        Ok(end)
    }
}

impl SeekableInput for File {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl SeekableInput for BufReader<File> {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().metadata()?.len())
    }
}

impl<T: AsRef<[u8]>> SeekableInput for Cursor<T> {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().as_ref().len() as u64)
    }
}

/// File-system layer: turns a path into a seekable input.
pub trait InputOpener {
    type Input: SeekableInput;

    fn open(&self, path: &Path) -> io::Result<Self::Input>;
}

/// Opens paths on the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl InputOpener for LocalFs {
    type Input = File;

    fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }
}

/// Buffered reader that tracks its absolute offset in the input.
pub(crate) struct PositionedReader<I> {
    inner: BufReader<I>,
    pos: u64,
}

impl<I: SeekableInput> PositionedReader<I> {
    pub(crate) fn new(input: I) -> Self {
        Self {
            inner: BufReader::new(input),
            pos: 0,
        }
    }

    /// Absolute offset of the next unread byte.
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn length(&mut self) -> io::Result<u64> {
        self.inner.get_mut().length()
    }

    /// True when no bytes remain.
    pub(crate) fn at_end(&mut self) -> io::Result<bool> {
        Ok(self.inner.fill_buf()?.is_empty())
    }
}

impl<I: Read> Read for PositionedReader<I> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<I: Read> BufRead for PositionedReader<I> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.pos += amt as u64;
    }
}
