//! Record encoding seam.
//!
//! The container only moves opaque record encodings around; turning them into
//! values is the job of a [`DatumReader`] bound to the file's writer schema and
//! a [`DatumWriter`] that knows its own schema. [`ValueReader`] and
//! [`ValueWriter`] implement the primitive binary encoding over [`Value`].

use std::fmt;

use bytes::Buf;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::varint;

/// Decodes records of one reader schema from block payloads.
pub trait DatumReader {
    /// Reusable record holder. `Default` provides the initial empty holder.
    type Datum: Default;

    /// Bind to the writer schema found in the container header.
    ///
    /// Fails with [`Error::SchemaResolution`] when the reader schema cannot
    /// read the writer's data.
    fn resolve(&mut self, writer_schema: &str) -> Result<()>;

    /// Decode one record from the front of `buf` into `holder`, advancing
    /// `buf` past it.
    ///
    /// Truncated input is [`Error::CorruptBlock`]; well-framed input that does
    /// not decode as the reader schema is [`Error::SchemaResolution`].
    fn read_into(&self, buf: &mut &[u8], holder: &mut Self::Datum) -> Result<()>;
}

/// Encodes records of one writer schema.
pub trait DatumWriter {
    type Datum;

    /// Writer schema JSON stored in the container header.
    fn schema(&self) -> String;

    fn write(&self, datum: &Self::Datum, buf: &mut Vec<u8>) -> Result<()>;
}

/// A primitive record value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Double(x) => write!(f, "{x}"),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::String(s) => f.write_str(s),
        }
    }
}

fn truncated(e: std::io::Error) -> Error {
    Error::corrupt(format!("record truncated: {e}"))
}

fn need(buf: &[u8], n: usize, what: &str) -> Result<()> {
    if buf.len() < n {
        return Err(Error::corrupt(format!(
            "record truncated: {what} needs {n} bytes, {} left",
            buf.len()
        )));
    }
    Ok(())
}

/// Reads primitive records as [`Value`], applying schema promotions.
#[derive(Debug, Clone)]
pub struct ValueReader {
    reader_schema: Schema,
    writer_schema: Option<Schema>,
}

impl ValueReader {
    pub fn new(reader_schema: Schema) -> Self {
        Self {
            reader_schema,
            writer_schema: None,
        }
    }

    pub fn reader_schema(&self) -> Schema {
        self.reader_schema
    }

    fn put_bytes(&self, raw: &[u8], holder: &mut Value) -> Result<()> {
        match self.reader_schema {
            Schema::String => {
                let s = std::str::from_utf8(raw).map_err(|e| {
                    Error::SchemaResolution(format!("bytes are not valid UTF-8 for a string: {e}"))
                })?;
                match holder {
                    Value::String(existing) => {
                        existing.clear();
                        existing.push_str(s);
                    }
                    other => *other = Value::String(s.to_string()),
                }
            }
            _ => match holder {
                Value::Bytes(existing) => {
                    existing.clear();
                    existing.extend_from_slice(raw);
                }
                other => *other = Value::Bytes(raw.to_vec()),
            },
        }
        Ok(())
    }
}

impl DatumReader for ValueReader {
    type Datum = Value;

    fn resolve(&mut self, writer_schema: &str) -> Result<()> {
        let writer = Schema::parse(writer_schema)?;
        if !self.reader_schema.can_read(writer) {
            return Err(Error::SchemaResolution(format!(
                "reader schema '{}' cannot read writer schema '{}'",
                self.reader_schema, writer
            )));
        }
        self.writer_schema = Some(writer);
        Ok(())
    }

    fn read_into(&self, buf: &mut &[u8], holder: &mut Value) -> Result<()> {
        let writer = self
            .writer_schema
            .ok_or(Error::InvalidState("datum reader used before resolve"))?;

        match writer {
            Schema::Null => *holder = Value::Null,
            Schema::Boolean => {
                need(buf, 1, "boolean")?;
                *holder = match buf.get_u8() {
                    0 => Value::Boolean(false),
                    1 => Value::Boolean(true),
                    b => return Err(Error::corrupt(format!("invalid boolean byte {b:#04x}"))),
                };
            }
            Schema::Int | Schema::Long => {
                let n = varint::get_long(buf).map_err(truncated)?;
                if writer == Schema::Int && i32::try_from(n).is_err() {
                    return Err(Error::corrupt(format!("int value {n} out of range")));
                }
                *holder = match self.reader_schema {
                    Schema::Int => Value::Int(n as i32),
                    Schema::Long => Value::Long(n),
                    Schema::Float => Value::Float(n as f32),
                    _ => Value::Double(n as f64),
                };
            }
            Schema::Float => {
                need(buf, 4, "float")?;
                let x = buf.get_f32_le();
                *holder = match self.reader_schema {
                    Schema::Float => Value::Float(x),
                    _ => Value::Double(x as f64),
                };
            }
            Schema::Double => {
                need(buf, 8, "double")?;
                *holder = Value::Double(buf.get_f64_le());
            }
            Schema::Bytes | Schema::String => {
                let raw = varint::get_bytes(buf).map_err(truncated)?;
                self.put_bytes(raw, holder)?;
            }
        }
        Ok(())
    }
}

/// Writes [`Value`]s that match its schema exactly.
#[derive(Debug, Clone, Copy)]
pub struct ValueWriter {
    schema: Schema,
}

impl ValueWriter {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }
}

impl DatumWriter for ValueWriter {
    type Datum = Value;

    fn schema(&self) -> String {
        self.schema.to_json()
    }

    fn write(&self, datum: &Value, buf: &mut Vec<u8>) -> Result<()> {
        match (self.schema, datum) {
            (Schema::Null, Value::Null) => {}
            (Schema::Boolean, Value::Boolean(b)) => buf.push(*b as u8),
            (Schema::Int, Value::Int(n)) => varint::put_long(buf, *n as i64),
            (Schema::Long, Value::Long(n)) => varint::put_long(buf, *n),
            (Schema::Float, Value::Float(x)) => buf.extend_from_slice(&x.to_le_bytes()),
            (Schema::Double, Value::Double(x)) => buf.extend_from_slice(&x.to_le_bytes()),
            (Schema::Bytes, Value::Bytes(b)) => varint::put_bytes(buf, b),
            (Schema::String, Value::String(s)) => varint::put_bytes(buf, s.as_bytes()),
            (schema, datum) => {
                return Err(Error::SchemaResolution(format!(
                    "{} datum does not match writer schema '{schema}'",
                    datum.type_name()
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(schema: Schema, values: &[Value]) -> Vec<u8> {
        let writer = ValueWriter::new(schema);
        let mut buf = Vec::new();
        for v in values {
            writer.write(v, &mut buf).unwrap();
        }
        buf
    }

    fn resolved(reader: Schema, writer: Schema) -> ValueReader {
        let mut r = ValueReader::new(reader);
        r.resolve(&writer.to_json()).unwrap();
        r
    }

    #[test]
    fn test_strings_reuse_holder() {
        let buf = encode(Schema::String, &["record1".into(), "r2".into()]);
        let reader = resolved(Schema::String, Schema::String);
        let mut cursor = buf.as_slice();
        let mut holder = Value::String(String::with_capacity(64));
        reader.read_into(&mut cursor, &mut holder).unwrap();
        assert_eq!(holder.as_str(), Some("record1"));
        reader.read_into(&mut cursor, &mut holder).unwrap();
        assert_eq!(holder.as_str(), Some("r2"));
        match &holder {
            Value::String(s) => assert!(s.capacity() >= 64),
            other => panic!("unexpected {other:?}"),
        }
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_int_promotes_to_long_and_double() {
        let buf = encode(Schema::Int, &[Value::Int(-7)]);
        let mut holder = Value::Null;
        resolved(Schema::Long, Schema::Int)
            .read_into(&mut buf.as_slice(), &mut holder)
            .unwrap();
        assert_eq!(holder, Value::Long(-7));
        resolved(Schema::Double, Schema::Int)
            .read_into(&mut buf.as_slice(), &mut holder)
            .unwrap();
        assert_eq!(holder, Value::Double(-7.0));
    }

    #[test]
    fn test_invalid_utf8_is_schema_resolution() {
        let buf = encode(Schema::Bytes, &[Value::Bytes(vec![0xFF, 0xFE])]);
        let mut holder = Value::Null;
        let err = resolved(Schema::String, Schema::Bytes)
            .read_into(&mut buf.as_slice(), &mut holder)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaResolution(_)), "{err}");
    }

    #[test]
    fn test_truncated_record_is_corrupt() {
        let buf = encode(Schema::Double, &[Value::Double(1.5)]);
        let mut holder = Value::Null;
        let err = resolved(Schema::Double, Schema::Double)
            .read_into(&mut &buf[..5], &mut holder)
            .unwrap_err();
        assert!(matches!(err, Error::CorruptBlock(_)), "{err}");
    }

    #[test]
    fn test_incompatible_schemas_rejected() {
        let mut reader = ValueReader::new(Schema::Long);
        let err = reader.resolve("\"string\"").unwrap_err();
        assert!(matches!(err, Error::SchemaResolution(_)));
        let err = ValueReader::new(Schema::Long)
            .read_into(&mut [0u8].as_slice(), &mut Value::Null)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_writer_rejects_mismatched_datum() {
        let mut buf = Vec::new();
        let err = ValueWriter::new(Schema::String)
            .write(&Value::Long(3), &mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaResolution(_)));
        assert!(buf.is_empty());
    }
}
