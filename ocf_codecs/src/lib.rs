mod deflate_codec;
mod lz4_codec;
mod zstd_codec;

pub use deflate_codec::DeflateCodec;
pub use lz4_codec::Lz4Codec;
pub use ocf_core::NullCodec;
pub use zstd_codec::ZstdCodec;

use std::sync::Arc;

use ocf_core::codec::NULL_CODEC;
use ocf_core::{Codec, CodecRegistry};

/// Names accepted by [`codec_by_name`], in display order.
pub const CODEC_NAMES: &[&str] = &[NULL_CODEC, "deflate", "zstandard", "lz4"];

/// Resolve a codec from the name stored in a container header (or given on
/// the command line). `level` is ignored by codecs without levels.
pub fn codec_by_name(name: &str, level: Option<i32>) -> anyhow::Result<Arc<dyn Codec>> {
    match name {
        NULL_CODEC | "none" => Ok(Arc::new(NullCodec)),
        "deflate" => Ok(Arc::new(match level {
            Some(l) => DeflateCodec::new(l)?,
            None => DeflateCodec::default(),
        })),
        "zstandard" | "zstd" => Ok(Arc::new(match level {
            Some(l) => ZstdCodec::new(l)?,
            None => ZstdCodec::default(),
        })),
        "lz4" => Ok(Arc::new(Lz4Codec)),
        other => anyhow::bail!(
            "unknown codec '{}'. Valid options: {}",
            other,
            CODEC_NAMES.join(", ")
        ),
    }
}

/// Registry over every bundled codec at its default level.
#[derive(Debug, Default, Clone, Copy)]
pub struct BundledCodecs;

impl CodecRegistry for BundledCodecs {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Codec>> {
        codec_by_name(name, None).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"the quick brown fox jumps over the lazy dog. the quick brown fox jumps over the lazy dog.";

    #[test]
    fn test_every_named_codec_roundtrips() {
        for name in CODEC_NAMES {
            let codec = codec_by_name(name, None).unwrap();
            assert_eq!(&codec.name(), name);
            let packed = codec.compress_block(SAMPLE).unwrap();
            assert_eq!(codec.decompress_block(&packed).unwrap(), SAMPLE, "{name}");
        }
    }

    #[test]
    fn test_empty_block_roundtrips() {
        for name in CODEC_NAMES {
            let codec = codec_by_name(name, None).unwrap();
            let packed = codec.compress_block(&[]).unwrap();
            assert!(codec.decompress_block(&packed).unwrap().is_empty(), "{name}");
        }
    }

    #[test]
    fn test_registry_and_aliases() {
        assert_eq!(BundledCodecs.resolve("zstd").unwrap().name(), "zstandard");
        assert_eq!(BundledCodecs.resolve("none").unwrap().name(), NULL_CODEC);
        assert!(BundledCodecs.resolve("snappy").is_none());
        let err = codec_by_name("snappy", None).err().unwrap().to_string();
        assert!(err.contains("unknown codec"), "{err}");
    }

    #[test]
    fn test_levels_validated() {
        assert!(codec_by_name("deflate", Some(9)).is_ok());
        assert!(codec_by_name("deflate", Some(12)).is_err());
        assert!(codec_by_name("zstandard", Some(19)).is_ok());
        assert!(codec_by_name("zstandard", Some(40)).is_err());
        // lz4 has no levels.
        assert!(codec_by_name("lz4", Some(40)).is_ok());
    }

    #[test]
    fn test_garbage_payload_fails_to_decompress() {
        let mut garbage = vec![0x10, 0, 0, 0];
        garbage.extend([0xFFu8; 28]);
        for name in ["deflate", "zstandard", "lz4"] {
            let codec = codec_by_name(name, None).unwrap();
            assert!(codec.decompress_block(&garbage).is_err(), "{name}");
        }
    }
}
