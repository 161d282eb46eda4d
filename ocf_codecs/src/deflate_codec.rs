use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use ocf_core::Codec;

/// Raw DEFLATE block codec (`deflate`), no zlib or gzip wrapper.
///
/// Slower than zstd and lz4 but the most widely readable compressed codec of
/// the container format.
pub struct DeflateCodec {
    /// Compression level 0 (store) to 9 (best).
    pub level: u32,
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl DeflateCodec {
    pub fn new(level: i32) -> anyhow::Result<Self> {
        if !(0..=9).contains(&level) {
            anyhow::bail!("deflate level {} out of range 0..=9", level);
        }
        Ok(Self {
            level: level as u32,
        })
    }
}

impl Codec for DeflateCodec {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(
            Vec::with_capacity(raw.len() / 2),
            Compression::new(self.level),
        );
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress_block(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(compressed.len() * 2);
        DeflateDecoder::new(compressed)
            .read_to_end(&mut raw)
            .map_err(|e| anyhow::anyhow!("deflate decompress error: {}", e))?;
        Ok(raw)
    }
}
