//! Sync markers: the 16-byte random sequence written after the header and
//! after every block.
//!
//! Readers find block boundaries from an arbitrary byte offset by scanning
//! forward for the marker; there is no block index. Writers decide when to cut
//! a block with a [`FlushPolicy`].

use std::fmt;
use std::io::{self, BufRead};

/// Length of a sync marker in bytes.
pub const SYNC_SIZE: usize = 16;

/// Default target for the raw (uncompressed) bytes buffered per block.
pub const DEFAULT_MAX_BLOCK_BYTES: usize = 64_000;

/// Per-file random sync marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncMarker(pub [u8; SYNC_SIZE]);

impl SyncMarker {
    /// Draw a fresh marker from the thread-local RNG.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; SYNC_SIZE] {
        &self.0
    }
}

impl fmt::Display for SyncMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SyncMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncMarker({self})")
    }
}

fn position_of(haystack: &[u8], marker: &[u8; SYNC_SIZE]) -> Option<usize> {
    haystack.windows(SYNC_SIZE).position(|w| w == marker)
}

/// Scan forward from the reader's current position for `marker`.
///
/// Returns the number of bytes consumed up to and including the first full
/// occurrence, leaving the reader positioned right after it, or `None` if the
/// input ends first (everything is consumed in that case). Occurrences that
/// straddle two `fill_buf` chunks are found.
pub fn find_marker<R: BufRead + ?Sized>(
    reader: &mut R,
    marker: &SyncMarker,
) -> io::Result<Option<u64>> {
    let needle = marker.as_bytes();
    let mut consumed: u64 = 0;
    // Trailing SYNC_SIZE - 1 bytes of everything consumed so far.
    let mut carry: Vec<u8> = Vec::with_capacity(2 * SYNC_SIZE);

    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            return Ok(None);
        }

        if !carry.is_empty() {
            let head = &chunk[..chunk.len().min(SYNC_SIZE - 1)];
            let mut joined = carry.clone();
            joined.extend_from_slice(head);
            if let Some(p) = position_of(&joined, needle) {
                let used = p + SYNC_SIZE - carry.len();
                reader.consume(used);
                return Ok(Some(consumed + used as u64));
            }
        }

        if let Some(p) = position_of(chunk, needle) {
            let used = p + SYNC_SIZE;
            reader.consume(used);
            return Ok(Some(consumed + used as u64));
        }

        let n = chunk.len();
        carry.extend_from_slice(&chunk[n.saturating_sub(SYNC_SIZE - 1)..]);
        if carry.len() > SYNC_SIZE - 1 {
            carry.drain(..carry.len() - (SYNC_SIZE - 1));
        }
        reader.consume(n);
        consumed += n as u64;
    }
}

/// Writer-side block cut policy.
///
/// A block is flushed as soon as either threshold is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Raw encoded bytes buffered before a block is cut.
    pub max_block_bytes: usize,
    /// Records buffered before a block is cut; `None` means no limit.
    pub max_block_records: Option<u64>,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
            max_block_records: None,
        }
    }
}

impl FlushPolicy {
    pub fn should_flush(&self, block_bytes: usize, block_records: u64) -> bool {
        if block_records == 0 {
            return false;
        }
        block_bytes >= self.max_block_bytes
            || self
                .max_block_records
                .is_some_and(|max| block_records >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    const MARKER: SyncMarker = SyncMarker(*b"0123456789abcdef");

    #[test]
    fn test_finds_marker_and_positions_after_it() {
        let mut data = b"xyz".to_vec();
        data.extend_from_slice(MARKER.as_bytes());
        data.extend_from_slice(b"tail");
        let mut cursor = Cursor::new(data);
        assert_eq!(find_marker(&mut cursor, &MARKER).unwrap(), Some(19));
        assert_eq!(cursor.position(), 19);
    }

    #[test]
    fn test_marker_straddling_buffer_chunks() {
        // 4-byte internal buffer forces the marker to span several fill_buf calls.
        for prefix in 0..9 {
            let mut data = vec![b'.'; prefix];
            data.extend_from_slice(MARKER.as_bytes());
            data.extend_from_slice(b"rest");
            let mut reader = BufReader::with_capacity(4, Cursor::new(data));
            let found = find_marker(&mut reader, &MARKER).unwrap();
            assert_eq!(found, Some(prefix as u64 + SYNC_SIZE as u64), "prefix {prefix}");
            let mut rest = String::new();
            std::io::Read::read_to_string(&mut reader, &mut rest).unwrap();
            assert_eq!(rest, "rest");
        }
    }

    #[test]
    fn test_partial_marker_then_eof() {
        let mut data = b"....".to_vec();
        data.extend_from_slice(&MARKER.as_bytes()[..10]);
        let mut reader = BufReader::with_capacity(3, Cursor::new(data));
        assert_eq!(find_marker(&mut reader, &MARKER).unwrap(), None);
    }

    #[test]
    fn test_near_miss_does_not_match() {
        let mut data = MARKER.0.to_vec();
        data[15] = b'X';
        data.extend_from_slice(MARKER.as_bytes());
        let mut cursor = Cursor::new(data);
        assert_eq!(find_marker(&mut cursor, &MARKER).unwrap(), Some(32));
    }

    #[test]
    fn test_flush_policy_thresholds() {
        let policy = FlushPolicy {
            max_block_bytes: 100,
            max_block_records: Some(3),
        };
        assert!(!policy.should_flush(0, 0));
        assert!(!policy.should_flush(99, 2));
        assert!(policy.should_flush(100, 1));
        assert!(policy.should_flush(10, 3));

        let bytes_only = FlushPolicy::default();
        assert!(!bytes_only.should_flush(63_999, 1_000_000));
        assert!(bytes_only.should_flush(64_000, 1));
    }

    #[test]
    fn test_random_markers_differ() {
        assert_ne!(SyncMarker::random(), SyncMarker::random());
        assert_eq!(MARKER.to_string(), "30313233343536373839616263646566");
    }
}
