use std::sync::Arc;

use tracing::{debug, trace};

use crate::block::{self, Block, BlockCursor};
use crate::codec::{resolve_codec, Codec, CodecRegistry};
use crate::datum::DatumReader;
use crate::error::{Error, Result};
use crate::format::Header;
use crate::input::{PositionedReader, SeekableInput};
use crate::sync::{find_marker, SYNC_SIZE};

/// Sequential reader over one container, with sync-marker repositioning.
///
/// # Open sequence
/// 1. Read magic, metadata and the file's sync marker.
/// 2. Resolve the codec named in the header (`null` is always available).
/// 3. Bind the datum reader to the writer schema.
///
/// # Positions
/// `previous_sync()` is the offset just past the most recently crossed sync
/// marker, which is also where the following block starts. It moves when
/// [`sync`](Self::sync) or [`seek`](Self::seek) reposition the reader, and
/// when the last record of a block has been handed out. A split reader compares
/// it against its end offset with [`past_sync`](Self::past_sync) to decide
/// which blocks it owns.
pub struct ContainerReader<I, D: DatumReader> {
    input: Option<PositionedReader<I>>,
    header: Header,
    codec: Arc<dyn Codec>,
    datum_reader: D,
    length: u64,
    block_start: u64,
    block: BlockCursor,
    /// Set once the `Iterator` impl has yielded an error.
    failed: bool,
}

impl<I: SeekableInput, D: DatumReader> ContainerReader<I, D> {
    /// Open a container from the start of `input`.
    pub fn open(input: I, mut datum_reader: D, codecs: &dyn CodecRegistry) -> Result<Self> {
        let mut input = PositionedReader::new(input);
        let length = input.length()?;
        let header = Header::read_from(&mut input)?;
        let codec = resolve_codec(codecs, &header.codec)?;
        datum_reader.resolve(&header.schema)?;
        let block_start = input.position();

        debug!(
            codec = %header.codec,
            schema = %header.schema,
            header_len = block_start,
            length,
            "opened container"
        );

        Ok(Self {
            input: Some(input),
            header,
            codec,
            datum_reader,
            length,
            block_start,
            block: BlockCursor::default(),
            failed: false,
        })
    }

    fn input(&mut self) -> Result<&mut PositionedReader<I>> {
        self.input.as_mut().ok_or(Error::Closed)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Total length of the input in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Scan forward from `offset` to the first sync marker and position the
    /// reader right after it.
    ///
    /// If no marker follows `offset`, the reader ends up at end of input and
    /// `previous_sync()` reports that position.
    pub fn sync(&mut self, offset: u64) -> Result<()> {
        let marker = self.header.sync;
        let input = self.input()?;
        input.seek_to(offset)?;
        let found = find_marker(input, &marker)?;
        let block_start = match found {
            Some(consumed) => offset + consumed,
            None => input.position(),
        };
        self.block_start = block_start;
        self.block = BlockCursor::default();
        debug!(offset, block_start = self.block_start, found = found.is_some(), "synced");
        Ok(())
    }

    /// Jump to a known block start, as returned by `previous_sync()` or by the
    /// writer's `sync()`.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.input()?.seek_to(position)?;
        self.block_start = position;
        self.block = BlockCursor::default();
        Ok(())
    }

    /// Offset just past the most recently crossed sync marker.
    pub fn previous_sync(&self) -> u64 {
        self.block_start
    }

    /// True once the reader has crossed a marker that starts at or after
    /// `position`, or has reached the end of the input.
    pub fn past_sync(&self, position: u64) -> bool {
        self.block_start >= position.saturating_add(SYNC_SIZE as u64)
            || self.block_start >= self.length
    }

    /// Absolute offset of the next unread byte of input.
    pub fn tell(&self) -> Result<u64> {
        self.input
            .as_ref()
            .map(PositionedReader::position)
            .ok_or(Error::Closed)
    }

    /// True if a record is available, loading the next non-empty block if the
    /// current one is used up.
    pub fn has_next(&mut self) -> Result<bool> {
        while self.block.remaining() == 0 {
            let marker = self.header.sync;
            let input = self.input()?;
            if input.at_end()? {
                return Ok(false);
            }
            let offset = input.position();
            let block = Block::read_from(input, &marker)?;
            let end = input.position();
            trace!(offset, count = block.count, payload = block.payload.len(), "read block");
            if block.count == 0 {
                self.block_start = end;
                continue;
            }
            self.block = block.decode(self.codec.as_ref())?;
        }
        Ok(true)
    }

    /// Decode the next record into `holder`, reusing its allocation.
    pub fn next_into(&mut self, holder: &mut D::Datum) -> Result<()> {
        if !self.has_next()? {
            return Err(Error::Exhausted);
        }
        self.block.next_into(&self.datum_reader, holder)?;
        if self.block.remaining() == 0 {
            self.block_start = self.tell()?;
        }
        Ok(())
    }

    /// Release the input. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.input.take().is_some() {
            self.block = BlockCursor::default();
            debug!(block_start = self.block_start, "closed container");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.input.is_none()
    }
}

impl<I: SeekableInput, D: DatumReader> Iterator for ContainerReader<I, D> {
    type Item = Result<D::Datum>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut datum = D::Datum::default();
        let result = match self.has_next() {
            Ok(false) => return None,
            Ok(true) => self.next_into(&mut datum).map(|_| datum),
            Err(e) => Err(e),
        };
        self.failed = result.is_err();
        Some(result)
    }
}

/// Location of one block, as found by [`block_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the block's count field.
    pub offset: u64,
    pub record_count: u64,
    pub payload_len: u64,
    /// Offset of the sync marker that follows the block.
    pub sync_offset: u64,
}

impl BlockInfo {
    /// Offset just past the trailing marker, where the next block starts.
    pub fn end(&self) -> u64 {
        self.sync_offset + SYNC_SIZE as u64
    }
}

/// Walk the block framing of a container without decompressing anything.
pub fn block_index<I: SeekableInput>(input: I) -> Result<(Header, Vec<BlockInfo>)> {
    let mut input = PositionedReader::new(input);
    let length = input.length()?;
    let header = Header::read_from(&mut input)?;
    let mut blocks = Vec::new();

    while !input.at_end()? {
        let offset = input.position();
        let (record_count, payload_len) = block::read_block_header(&mut input)?;
        let sync_offset = input.position() + payload_len;
        if sync_offset + SYNC_SIZE as u64 > length {
            return Err(Error::corrupt(format!(
                "block at {offset} claims {payload_len} payload bytes past end of input"
            )));
        }
        input.seek_to(sync_offset)?;
        block::check_sync(&mut input, &header.sync)?;
        blocks.push(BlockInfo {
            offset,
            record_count,
            payload_len,
            sync_offset,
        });
    }
    Ok((header, blocks))
}
