use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::block::encode_block;
use crate::codec::Codec;
use crate::datum::DatumWriter;
use crate::error::{Error, Result};
use crate::format::Header;
use crate::sync::{FlushPolicy, SyncMarker};

/// Knobs for [`ContainerWriter::create`].
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub flush_policy: FlushPolicy,
    /// Fixed marker instead of a random one (reproducible files).
    pub sync_marker: Option<SyncMarker>,
    /// User metadata; keys must not use the reserved `avro.` prefix.
    pub metadata: BTreeMap<String, Vec<u8>>,
}

/// Streaming writer for container files.
///
/// # Write contract
/// Call [`append`](Self::append) any number of times. Encoded records gather
/// in the current block, which is compressed and written, followed by the sync
/// marker, whenever the [`FlushPolicy`] says so. [`sync`](Self::sync) cuts a
/// block early. [`close`](Self::close) flushes the last partial block.
///
/// # Format layout written
/// ```text
/// [MAGIC] [METADATA] [SYNC]
/// [count size payload] [SYNC]      ← one per flushed block
/// ...
/// ```
/// There is no index and no trailer: readers find blocks by scanning for the
/// marker.
pub struct ContainerWriter<W: Write, D: DatumWriter> {
    sink: W,
    datum_writer: D,
    codec: Arc<dyn Codec>,
    sync: SyncMarker,
    policy: FlushPolicy,
    /// Encoded records of the current block.
    buffer: Vec<u8>,
    buffered_records: u64,
    /// Bytes written to the sink so far.
    position: u64,
    blocks_written: u64,
    /// A block or sink flush failed; the sink may hold a torn block.
    failed: bool,
    closed: bool,
}

impl<W: Write, D: DatumWriter> ContainerWriter<W, D> {
    /// Write the header to `sink` and start an empty block.
    pub fn create(
        mut sink: W,
        datum_writer: D,
        codec: Arc<dyn Codec>,
        options: WriterOptions,
    ) -> Result<Self> {
        let sync = options.sync_marker.unwrap_or_else(SyncMarker::random);
        let header = Header::new(datum_writer.schema(), codec.name(), sync, &options.metadata)?;
        let bytes = header.to_bytes();
        sink.write_all(&bytes)?;
        debug!(codec = codec.name(), schema = %header.schema, %sync, "created container");

        Ok(Self {
            sink,
            datum_writer,
            codec,
            sync,
            policy: options.flush_policy,
            buffer: Vec::with_capacity(options.flush_policy.max_block_bytes.min(1 << 20)),
            buffered_records: 0,
            position: bytes.len() as u64,
            blocks_written: 0,
            failed: false,
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.failed {
            return Err(Error::InvalidState("writer failed on an earlier block"));
        }
        Ok(())
    }

    /// Run a sink-touching step, marking the writer failed if it errors.
    fn guarded<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = step(self);
        if let Err(e) = &result {
            warn!(offset = self.position, error = %e, "container writer failed");
            self.failed = true;
        }
        result
    }

    /// Encode `datum` into the current block, flushing it if it is full.
    ///
    /// A failed flush leaves the writer failed: later appends and syncs are
    /// rejected and `close` no longer touches the sink.
    pub fn append(&mut self, datum: &D::Datum) -> Result<()> {
        self.check_open()?;
        let mark = self.buffer.len();
        if let Err(e) = self.datum_writer.write(datum, &mut self.buffer) {
            self.buffer.truncate(mark);
            return Err(e);
        }
        self.buffered_records += 1;
        if self.policy.should_flush(self.buffer.len(), self.buffered_records) {
            self.guarded(Self::write_block)?;
        }
        Ok(())
    }

    fn write_block(&mut self) -> Result<()> {
        if self.buffered_records == 0 {
            return Ok(());
        }
        let block = encode_block(&self.buffer, self.buffered_records, self.codec.as_ref())?;
        let written = block.write_to(&mut self.sink, &self.sync)?;
        debug!(
            records = self.buffered_records,
            raw_bytes = self.buffer.len(),
            payload_bytes = block.payload.len(),
            offset = self.position,
            "flushed block"
        );
        self.position += written;
        self.blocks_written += 1;
        self.buffer.clear();
        self.buffered_records = 0;
        Ok(())
    }

    /// Force a block boundary. Returns the offset just past the marker, which
    /// a reader can `seek` to.
    pub fn sync(&mut self) -> Result<u64> {
        self.check_open()?;
        self.guarded(Self::write_block)?;
        Ok(self.position)
    }

    /// Cut the current block and flush the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.sync()?;
        self.guarded(|w| Ok(w.sink.flush()?))
    }

    /// Flush the last partial block and the sink. Later calls do nothing.
    ///
    /// After an earlier failure the buffered records are dropped and nothing
    /// more is written; the original error is the one that was reported.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.failed {
            debug!(dropped_records = self.buffered_records, "closing failed container writer");
            return Ok(());
        }
        self.guarded(|w| {
            w.write_block()?;
            Ok(w.sink.flush()?)
        })?;
        debug!(blocks = self.blocks_written, bytes = self.position, "closed container writer");
        Ok(())
    }

    /// Bytes written to the sink so far (buffered records excluded).
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    pub fn sync_marker(&self) -> SyncMarker {
        self.sync
    }

    /// Close and hand back the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.close()?;
        Ok(self.sink)
    }
}
