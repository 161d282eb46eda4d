//! Byte-range split reading.
//!
//! A split is an arbitrary `[start, start + length)` range chosen without any
//! knowledge of block boundaries. Blocks are never shared: each block is read
//! in full by the one split whose range contains the start of the sync marker
//! that precedes it. When splits are contiguous, disjoint and cover the whole
//! file, every record is read exactly once across all workers.
//!
//! The last block a split owns can extend arbitrarily far past the split's
//! nominal end; only the position of its preceding marker matters.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::CodecRegistry;
use crate::datum::DatumReader;
use crate::error::{Error, Result};
use crate::input::{InputOpener, SeekableInput};
use crate::reader::ContainerReader;

/// A byte range of one container file assigned to a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSplit {
    pub path: PathBuf,
    pub start: u64,
    pub length: u64,
}

impl FileSplit {
    pub fn new(path: impl Into<PathBuf>, start: u64, length: u64) -> Self {
        Self {
            path: path.into(),
            start,
            length,
        }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }
}

/// Fixed-size splitting policy: contiguous, disjoint splits of `split_size`
/// bytes (the last one shorter) covering `[0, file_len)`.
///
/// An empty file yields a single empty split so a worker still opens it.
pub fn plan_splits(path: &Path, file_len: u64, split_size: u64) -> Vec<FileSplit> {
    let split_size = split_size.max(1);
    if file_len == 0 {
        return vec![FileSplit::new(path, 0, 0)];
    }
    std::iter::successors(Some(0u64), |&start| {
        start.checked_add(split_size).filter(|&next| next < file_len)
    })
    .map(|start| FileSplit::new(path, start, split_size.min(file_len - start)))
    .collect()
}

/// Which output slot the decoded record is exposed through.
///
/// Key/value frameworks either carry the record as the key (with an empty
/// value) or as the value (with an empty key).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Slot {
    #[default]
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitState {
    Uninitialized,
    /// Synced to the first owned block; nothing read yet.
    Positioned,
    Iterating,
    Exhausted,
    /// `initialize` or `advance` failed; only `close` is meaningful.
    Failed,
    Closed,
}

/// Reads the records owned by one [`FileSplit`].
///
/// Owns its container reader and a single record holder that is overwritten
/// on every successful [`advance`](Self::advance); clone the record if it must
/// outlive the next call.
pub struct SplitReader<I, D: DatumReader> {
    datum_reader: Option<D>,
    reader: Option<ContainerReader<I, D>>,
    current: D::Datum,
    slot: Slot,
    /// Offset of the first block this split owns.
    start: u64,
    /// Nominal end of the split; not block aligned.
    end: u64,
    state: SplitState,
}

impl<I: SeekableInput, D: DatumReader> SplitReader<I, D> {
    pub fn new(datum_reader: D, slot: Slot) -> Self {
        Self {
            datum_reader: Some(datum_reader),
            reader: None,
            current: D::Datum::default(),
            slot,
            start: 0,
            end: 0,
            state: SplitState::Uninitialized,
        }
    }

    /// Open the split's file and position on the first block it owns.
    pub fn initialize<O>(
        &mut self,
        split: &FileSplit,
        opener: &O,
        codecs: &dyn CodecRegistry,
    ) -> Result<()>
    where
        O: InputOpener<Input = I>,
    {
        if self.state != SplitState::Uninitialized {
            return Err(Error::InvalidState("split reader already initialized"));
        }
        let datum_reader = self
            .datum_reader
            .take()
            .ok_or(Error::InvalidState("split reader has no datum reader"))?;

        match Self::position(split, opener, datum_reader, codecs) {
            Ok(reader) => {
                self.start = reader.previous_sync();
                self.end = split.end();
                self.reader = Some(reader);
                self.state = SplitState::Positioned;
                debug!(
                    path = %split.path.display(),
                    split_start = split.start,
                    start = self.start,
                    end = self.end,
                    "initialized split"
                );
                Ok(())
            }
            Err(e) => {
                self.state = SplitState::Failed;
                Err(e)
            }
        }
    }

    fn position<O>(
        split: &FileSplit,
        opener: &O,
        datum_reader: D,
        codecs: &dyn CodecRegistry,
    ) -> Result<ContainerReader<I, D>>
    where
        O: InputOpener<Input = I>,
    {
        let input = opener.open(&split.path)?;
        let mut reader = ContainerReader::open(input, datum_reader, codecs)?;
        reader.sync(split.start)?;
        Ok(reader)
    }

    /// Load the next owned record into the holder.
    ///
    /// Returns `false` once the next block starts past this split (or the file
    /// ends); later calls keep returning `false` without touching the input.
    /// Any error ends the split: the reader moves to `Failed` and later calls
    /// fail without reading further.
    pub fn advance(&mut self) -> Result<bool> {
        match self.state {
            SplitState::Positioned | SplitState::Iterating => {}
            SplitState::Exhausted => return Ok(false),
            SplitState::Uninitialized => {
                return Err(Error::InvalidState("split reader not initialized"))
            }
            SplitState::Failed => return Err(Error::InvalidState("split reader failed")),
            SplitState::Closed => return Err(Error::Closed),
        }
        match self.step() {
            Ok(true) => {
                self.state = SplitState::Iterating;
                Ok(true)
            }
            Ok(false) => {
                self.state = SplitState::Exhausted;
                Ok(false)
            }
            Err(e) => {
                warn!(end = self.end, error = %e, "split aborted");
                self.state = SplitState::Failed;
                Err(e)
            }
        }
    }

    fn step(&mut self) -> Result<bool> {
        let reader = self.reader.as_mut().ok_or(Error::Closed)?;
        if reader.has_next()? && !reader.past_sync(self.end) {
            reader.next_into(&mut self.current)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// The most recently read record.
    pub fn current(&self) -> &D::Datum {
        &self.current
    }

    /// The record if this reader exposes it as the key.
    pub fn current_key(&self) -> Option<&D::Datum> {
        (self.slot == Slot::Key).then_some(&self.current)
    }

    /// The record if this reader exposes it as the value.
    pub fn current_value(&self) -> Option<&D::Datum> {
        (self.slot == Slot::Value).then_some(&self.current)
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Approximate fraction of the split consumed, from block boundaries.
    ///
    /// 0 before initialization, after close, for an empty split, and for a
    /// split whose first marker lies at or past its end (it owns no blocks).
    pub fn progress(&self) -> f32 {
        let Some(reader) = self.reader.as_ref() else {
            return 0.0;
        };
        if self.end <= self.start {
            return 0.0;
        }
        let bytes_read = reader.previous_sync().saturating_sub(self.start);
        let bytes_total = self.end - self.start;
        debug!(bytes_read, bytes_total, "split progress");
        (bytes_read as f64 / bytes_total as f64).clamp(0.0, 1.0) as f32
    }

    /// Offset of the first block this split owns.
    pub fn start_position(&self) -> u64 {
        self.start
    }

    pub fn end_position(&self) -> u64 {
        self.end
    }

    pub fn state(&self) -> SplitState {
        self.state
    }

    /// Release the input. Safe in every state, including after a failed
    /// `initialize`, and safe to repeat.
    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
        self.datum_reader = None;
        self.state = SplitState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_splits_covers_file() {
        let splits = plan_splits(Path::new("f"), 10, 4);
        let ranges: Vec<(u64, u64)> = splits.iter().map(|s| (s.start, s.end())).collect();
        assert_eq!(ranges, vec![(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn test_plan_splits_edge_sizes() {
        assert_eq!(plan_splits(Path::new("f"), 0, 4), vec![FileSplit::new("f", 0, 0)]);
        assert_eq!(plan_splits(Path::new("f"), 3, 0).len(), 3);
        assert_eq!(plan_splits(Path::new("f"), 3, 100), vec![FileSplit::new("f", 0, 3)]);
    }

    #[test]
    fn test_split_bounds_saturate() {
        let split = FileSplit::new("f", u64::MAX - 3, 10);
        assert_eq!(split.end(), u64::MAX);
        let splits = plan_splits(Path::new("f"), u64::MAX, u64::MAX / 2 + 1);
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[1].end(), u64::MAX);
    }

    #[test]
    fn test_slot_selects_output() {
        use crate::datum::ValueReader;
        use crate::schema::Schema;
        use std::io::Cursor;

        let key: SplitReader<Cursor<Vec<u8>>, _> =
            SplitReader::new(ValueReader::new(Schema::String), Slot::Key);
        assert!(key.current_key().is_some());
        assert!(key.current_value().is_none());

        let value: SplitReader<Cursor<Vec<u8>>, _> =
            SplitReader::new(ValueReader::new(Schema::String), Slot::Value);
        assert!(value.current_key().is_none());
        assert!(value.current_value().is_some());
        assert_eq!(value.progress(), 0.0);
    }
}
