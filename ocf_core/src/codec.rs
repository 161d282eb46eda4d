use std::sync::Arc;

/// Block compression capability.
///
/// Each `Codec` implementation:
/// - Is identified by a stable `name()` stored under `avro.codec` in the file
///   header.
/// - Must compress/decompress individual block payloads independently. No
///   cross-block state is permitted; this is what lets a split reader start
///   decoding at any block boundary.
pub trait Codec: Send + Sync {
    /// Name written to the file header (`null`, `deflate`, `zstandard`, ...).
    fn name(&self) -> &'static str;

    /// Compress the concatenated record encodings of one block.
    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Inverse of [`Codec::compress_block`].
    fn decompress_block(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Name of the identity codec, also implied when a header has no codec entry.
pub const NULL_CODEC: &str = "null";

/// Identity codec: payloads are stored verbatim. Always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCodec;

impl Codec for NullCodec {
    fn name(&self) -> &'static str {
        NULL_CODEC
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

/// Name → codec lookup used when opening a container.
///
/// Readers always fall back to [`NullCodec`] for `null`, so a registry only
/// needs to know about real compressors.
pub trait CodecRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Codec>>;
}

/// Registry that knows only the identity codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOnly;

impl CodecRegistry for NullOnly {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Codec>> {
        (name == NULL_CODEC).then(|| Arc::new(NullCodec) as Arc<dyn Codec>)
    }
}

/// Resolve `name` through `registry`, with `null` always available.
pub fn resolve_codec(registry: &dyn CodecRegistry, name: &str) -> crate::Result<Arc<dyn Codec>> {
    if name == NULL_CODEC {
        return Ok(Arc::new(NullCodec));
    }
    registry
        .resolve(name)
        .ok_or_else(|| crate::Error::UnknownCodec(name.to_string()))
}
