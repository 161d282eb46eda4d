//! Container header layout.
//!
//! ```text
//! [MAGIC: "Obj" 0x01]
//! [METADATA: map<string, bytes>]     ← avro.schema, avro.codec, user keys
//! [SYNC: 16 bytes]
//! [BLOCK 0] [SYNC] [BLOCK 1] [SYNC] ... [BLOCK N-1] [SYNC]
//! ```
//!
//! A map is written as map blocks: `count:long` then `count` pairs of
//! `key:string value:bytes`, terminated by a zero count. A negative count
//! means `|count|` entries preceded by a `byte-size:long`.

use std::collections::BTreeMap;
use std::io::{self, Read};

use crate::codec::NULL_CODEC;
use crate::error::{Error, Result};
use crate::sync::{SyncMarker, SYNC_SIZE};
use crate::varint;

/// Magic bytes at offset 0 of every container.
pub const MAGIC: &[u8; 4] = b"Obj\x01";

/// Metadata key holding the writer schema JSON.
pub const SCHEMA_KEY: &str = "avro.schema";

/// Metadata key holding the codec name.
pub const CODEC_KEY: &str = "avro.codec";

/// Metadata keys with this prefix are managed by the writer.
pub const RESERVED_PREFIX: &str = "avro.";

/// Decoded container header.
#[derive(Debug, Clone)]
pub struct Header {
    /// Writer schema JSON.
    pub schema: String,
    /// Codec name; `null` when the header carries no codec entry.
    pub codec: String,
    pub sync: SyncMarker,
    /// Every metadata entry, reserved keys included.
    pub metadata: BTreeMap<String, Vec<u8>>,
}

fn header_io(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::format("truncated header")
    } else if e.kind() == io::ErrorKind::InvalidData {
        Error::format(format!("malformed header metadata: {e}"))
    } else {
        Error::Io(e)
    }
}

impl Header {
    pub fn new(
        schema: impl Into<String>,
        codec: &str,
        sync: SyncMarker,
        user_metadata: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Self> {
        if let Some(key) = user_metadata
            .keys()
            .find(|k| k.starts_with(RESERVED_PREFIX))
        {
            return Err(Error::InvalidConfiguration(format!(
                "metadata key '{key}' uses the reserved '{RESERVED_PREFIX}' prefix"
            )));
        }
        let schema = schema.into();
        let mut metadata = user_metadata.clone();
        metadata.insert(SCHEMA_KEY.to_string(), schema.clone().into_bytes());
        metadata.insert(CODEC_KEY.to_string(), codec.as_bytes().to_vec());
        Ok(Self {
            schema,
            codec: codec.to_string(),
            sync,
            metadata,
        })
    }

    pub fn get_meta(&self, key: &str) -> Option<&[u8]> {
        self.metadata.get(key).map(Vec::as_slice)
    }

    /// Serialize magic, metadata map and sync marker.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.schema.len());
        buf.extend_from_slice(MAGIC);
        if !self.metadata.is_empty() {
            varint::put_long(&mut buf, self.metadata.len() as i64);
            for (key, value) in &self.metadata {
                varint::put_bytes(&mut buf, key.as_bytes());
                varint::put_bytes(&mut buf, value);
            }
        }
        varint::put_long(&mut buf, 0);
        buf.extend_from_slice(self.sync.as_bytes());
        buf
    }

    /// Parse a header from the start of a container.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(header_io)?;
        if &magic != MAGIC {
            return Err(Error::format(format!(
                "bad magic {magic:02x?}, not an object container file"
            )));
        }

        let mut metadata = BTreeMap::new();
        loop {
            let mut count = varint::read_long(reader).map_err(header_io)?;
            if count == 0 {
                break;
            }
            if count < 0 {
                count = count.checked_neg().ok_or_else(|| Error::format("bad map count"))?;
                // Byte size of the map block; entries are read individually.
                varint::read_long(reader).map_err(header_io)?;
            }
            for _ in 0..count {
                let key = varint::read_bytes(reader).map_err(header_io)?;
                let key = String::from_utf8(key)
                    .map_err(|_| Error::format("metadata key is not UTF-8"))?;
                let value = varint::read_bytes(reader).map_err(header_io)?;
                metadata.insert(key, value);
            }
        }

        let mut sync = [0u8; SYNC_SIZE];
        reader.read_exact(&mut sync).map_err(header_io)?;

        let schema = metadata
            .get(SCHEMA_KEY)
            .ok_or_else(|| Error::format(format!("header has no '{SCHEMA_KEY}' entry")))?;
        let schema = String::from_utf8(schema.clone())
            .map_err(|_| Error::format("writer schema is not UTF-8"))?;
        let codec = match metadata.get(CODEC_KEY) {
            Some(name) => String::from_utf8(name.clone())
                .map_err(|_| Error::format("codec name is not UTF-8"))?,
            None => NULL_CODEC.to_string(),
        };

        Ok(Self {
            schema,
            codec,
            sync: SyncMarker(sync),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        let mut user = BTreeMap::new();
        user.insert("origin".to_string(), b"unit-test".to_vec());
        Header::new("\"string\"", "deflate", SyncMarker([7u8; SYNC_SIZE]), &user).unwrap()
    }

    #[test]
    fn test_header_roundtrip_preserves_metadata() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(&bytes[bytes.len() - SYNC_SIZE..], &[7u8; SYNC_SIZE]);

        let parsed = Header::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.schema, "\"string\"");
        assert_eq!(parsed.codec, "deflate");
        assert_eq!(parsed.sync, header.sync);
        assert_eq!(parsed.get_meta("origin"), Some(&b"unit-test"[..]));
    }

    #[test]
    fn test_missing_codec_means_null() {
        let mut buf = MAGIC.to_vec();
        varint::put_long(&mut buf, 1);
        varint::put_bytes(&mut buf, SCHEMA_KEY.as_bytes());
        varint::put_bytes(&mut buf, b"\"long\"");
        varint::put_long(&mut buf, 0);
        buf.extend_from_slice(&[1u8; SYNC_SIZE]);
        let parsed = Header::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed.codec, NULL_CODEC);
    }

    #[test]
    fn test_negative_map_count_with_byte_size() {
        let mut entry = Vec::new();
        varint::put_bytes(&mut entry, SCHEMA_KEY.as_bytes());
        varint::put_bytes(&mut entry, b"\"int\"");

        let mut buf = MAGIC.to_vec();
        varint::put_long(&mut buf, -1);
        varint::put_long(&mut buf, entry.len() as i64);
        buf.extend_from_slice(&entry);
        varint::put_long(&mut buf, 0);
        buf.extend_from_slice(&[2u8; SYNC_SIZE]);
        let parsed = Header::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed.schema, "\"int\"");
    }

    #[test]
    fn test_bad_magic_and_truncation_are_format_errors() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Header::read_from(&mut bytes.as_slice()),
            Err(Error::InvalidFormat(_))
        ));

        let bytes = sample().to_bytes();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(
            Header::read_from(&mut &cut[..]),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_reserved_user_key_rejected() {
        let mut user = BTreeMap::new();
        user.insert("avro.custom".to_string(), vec![]);
        let err = Header::new("\"string\"", NULL_CODEC, SyncMarker([0; SYNC_SIZE]), &user)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
