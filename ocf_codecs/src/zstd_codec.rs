use ocf_core::Codec;

/// Zstandard block codec (`zstandard`).
///
/// Each block payload is one independent zstd frame at the configured level
/// (default: 3), so any block decodes without its neighbours.
///
/// Best for: general text, JSON, logs, mixed structured data.
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> anyhow::Result<Self> {
        if !(1..=22).contains(&level) {
            anyhow::bail!("zstandard level {} out of range 1..=22", level);
        }
        Ok(Self { level })
    }
}

impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstandard"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let compressed = zstd::bulk::compress(raw, self.level)?;
        Ok(compressed)
    }

    fn decompress_block(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>> {
        // The frame carries its own content size; no need to pre-size.
        let raw = zstd::decode_all(compressed)?;
        Ok(raw)
    }
}
