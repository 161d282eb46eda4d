//! Block framing: `count:long size:long payload[size] sync[16]`.
//!
//! A block is the unit of compression and of split ownership. Its payload
//! decompresses to exactly `count` concatenated record encodings.

use std::io::{self, Read, Write};

use crate::codec::Codec;
use crate::datum::DatumReader;
use crate::error::{Error, Result};
use crate::sync::{SyncMarker, SYNC_SIZE};
use crate::varint;

/// One compressed block as stored on disk.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub count: u64,
    pub payload: Vec<u8>,
}

/// Compress `raw` (the concatenated encodings of `count` records) into a block.
pub fn encode_block(raw: &[u8], count: u64, codec: &dyn Codec) -> Result<Block> {
    let payload = codec
        .compress_block(raw)
        .map_err(|e| Error::Codec(format!("{} compress failed: {e:#}", codec.name())))?;
    Ok(Block { count, payload })
}

fn block_io(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::corrupt("block truncated"),
        io::ErrorKind::InvalidData => Error::corrupt(format!("bad block header: {e}")),
        _ => Error::Io(e),
    }
}

impl Block {
    /// Write the block header, payload and trailing sync marker. Returns the
    /// number of bytes written.
    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W, sync: &SyncMarker) -> io::Result<u64> {
        let count = self.count as i64;
        let size = self.payload.len() as i64;
        let mut head = Vec::with_capacity(varint::long_len(count) + varint::long_len(size));
        varint::put_long(&mut head, count);
        varint::put_long(&mut head, size);
        sink.write_all(&head)?;
        sink.write_all(&self.payload)?;
        sink.write_all(sync.as_bytes())?;
        Ok((head.len() + self.payload.len() + SYNC_SIZE) as u64)
    }

    /// Read one block and check the marker that must follow it.
    ///
    /// The caller must already know a block starts here (i.e. the input is not
    /// at end of file).
    pub fn read_from<R: Read + ?Sized>(reader: &mut R, sync: &SyncMarker) -> Result<Self> {
        let (count, size) = read_block_header(reader)?;
        let mut payload = Vec::new();
        (&mut *reader)
            .take(size)
            .read_to_end(&mut payload)
            .map_err(block_io)?;
        if payload.len() as u64 != size {
            return Err(Error::corrupt(format!(
                "block payload truncated: expected {size} bytes, got {}",
                payload.len()
            )));
        }
        check_sync(reader, sync)?;
        Ok(Self { count, payload })
    }

    /// Decompress the payload into a cursor over exactly `count` records.
    pub fn decode(&self, codec: &dyn Codec) -> Result<BlockCursor> {
        let data = codec.decompress_block(&self.payload).map_err(|e| {
            Error::corrupt(format!("{} decompress failed: {e:#}", codec.name()))
        })?;
        Ok(BlockCursor {
            data,
            offset: 0,
            remaining: self.count,
        })
    }
}

/// Read `count` and `size`, rejecting negative values.
pub(crate) fn read_block_header<R: Read + ?Sized>(reader: &mut R) -> Result<(u64, u64)> {
    let count = varint::read_long(reader).map_err(block_io)?;
    let size = varint::read_long(reader).map_err(block_io)?;
    if count < 0 || size < 0 {
        return Err(Error::corrupt(format!(
            "negative block header fields: count={count} size={size}"
        )));
    }
    Ok((count as u64, size as u64))
}

pub(crate) fn check_sync<R: Read + ?Sized>(reader: &mut R, sync: &SyncMarker) -> Result<()> {
    let mut found = [0u8; SYNC_SIZE];
    reader.read_exact(&mut found).map_err(block_io)?;
    if &found != sync.as_bytes() {
        return Err(Error::corrupt(format!(
            "invalid sync marker: expected {sync}, found {}",
            SyncMarker(found)
        )));
    }
    Ok(())
}

/// Decoded block payload with a record countdown.
#[derive(Debug, Default)]
pub struct BlockCursor {
    data: Vec<u8>,
    offset: usize,
    remaining: u64,
}

impl BlockCursor {
    /// Records not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Decode the next record into `holder`.
    ///
    /// Running out of bytes before the advertised count, or bytes left over
    /// after the last record, is [`Error::CorruptBlock`].
    pub fn next_into<D: DatumReader>(&mut self, reader: &D, holder: &mut D::Datum) -> Result<()> {
        if self.remaining == 0 {
            return Err(Error::Exhausted);
        }
        let mut buf = &self.data[self.offset..];
        let before = buf.len();
        reader.read_into(&mut buf, holder)?;
        self.offset += before - buf.len();
        self.remaining -= 1;
        if self.remaining == 0 && self.offset != self.data.len() {
            return Err(Error::corrupt(format!(
                "{} trailing bytes after the last record",
                self.data.len() - self.offset
            )));
        }
        Ok(())
    }

    /// Split the payload into the raw encodings of every remaining record,
    /// using `reader` only to find record boundaries.
    #[cfg(test)]
    pub(crate) fn into_records<D: DatumReader>(mut self, reader: &D) -> Result<Vec<Vec<u8>>> {
        // The count comes from the file; never reserve more than the payload can hold.
        let cap = usize::try_from(self.remaining)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let mut records = Vec::with_capacity(cap);
        let mut scratch = D::Datum::default();
        while self.remaining > 0 {
            let start = self.offset;
            self.next_into(reader, &mut scratch)?;
            records.push(self.data[start..self.offset].to_vec());
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NullCodec;
    use crate::datum::{DatumWriter, Value, ValueReader, ValueWriter};
    use crate::schema::Schema;

    const SYNC: SyncMarker = SyncMarker([0xAB; SYNC_SIZE]);

    fn string_block(records: &[&str]) -> Block {
        let writer = ValueWriter::new(Schema::String);
        let mut raw = Vec::new();
        for r in records {
            writer.write(&Value::from(*r), &mut raw).unwrap();
        }
        encode_block(&raw, records.len() as u64, &NullCodec).unwrap()
    }

    fn string_reader() -> ValueReader {
        let mut r = ValueReader::new(Schema::String);
        r.resolve("\"string\"").unwrap();
        r
    }

    #[test]
    fn test_block_framing_roundtrip() {
        let block = string_block(&["record1", "record2"]);
        let mut buf = Vec::new();
        let written = block.write_to(&mut buf, &SYNC).unwrap();
        assert_eq!(written, buf.len() as u64);
        assert_eq!(&buf[buf.len() - SYNC_SIZE..], SYNC.as_bytes());

        let read = Block::read_from(&mut buf.as_slice(), &SYNC).unwrap();
        let records = read.decode(&NullCodec).unwrap().into_records(&string_reader()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1..], b"record1");
    }

    #[test]
    fn test_wrong_marker_is_corrupt() {
        let mut buf = Vec::new();
        string_block(&["a"]).write_to(&mut buf, &SYNC).unwrap();
        let other = SyncMarker([0xCD; SYNC_SIZE]);
        let err = Block::read_from(&mut buf.as_slice(), &other).unwrap_err();
        assert!(matches!(err, Error::CorruptBlock(_)), "{err}");
    }

    #[test]
    fn test_count_larger_than_payload_is_corrupt() {
        let mut block = string_block(&["a", "b"]);
        block.count = 3;
        let mut cursor = block.decode(&NullCodec).unwrap();
        let reader = string_reader();
        let mut holder = Value::Null;
        cursor.next_into(&reader, &mut holder).unwrap();
        cursor.next_into(&reader, &mut holder).unwrap();
        let err = cursor.next_into(&reader, &mut holder).unwrap_err();
        assert!(matches!(err, Error::CorruptBlock(_)), "{err}");
    }

    #[test]
    fn test_absurd_count_fails_without_huge_allocation() {
        let mut block = string_block(&["a", "b"]);
        block.count = u64::MAX;
        let err = block
            .decode(&NullCodec)
            .unwrap()
            .into_records(&string_reader())
            .unwrap_err();
        assert!(matches!(err, Error::CorruptBlock(_)), "{err}");
    }

    #[test]
    fn test_count_smaller_than_payload_is_corrupt() {
        let mut block = string_block(&["a", "b"]);
        block.count = 1;
        let err = block
            .decode(&NullCodec)
            .unwrap()
            .into_records(&string_reader())
            .unwrap_err();
        assert!(matches!(err, Error::CorruptBlock(_)), "{err}");
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let mut buf = Vec::new();
        string_block(&["record1"]).write_to(&mut buf, &SYNC).unwrap();
        buf.truncate(5);
        let err = Block::read_from(&mut buf.as_slice(), &SYNC).unwrap_err();
        assert!(matches!(err, Error::CorruptBlock(_)), "{err}");
    }
}
