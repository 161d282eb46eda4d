use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use ocf_core::Codec;

/// LZ4 block codec.
///
/// Fastest decompression of the bundled codecs. The payload is an LZ4 block
/// prefixed with its uncompressed size (4 bytes LE). Not part of the standard
/// container codec set, so files written with it are only readable by readers
/// that register `lz4`.
///
/// Best for: hot data where split readers are CPU bound on decode.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(raw))
    }

    fn decompress_block(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>> {
        let raw = decompress_size_prepended(compressed)
            .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        Ok(raw)
    }
}
