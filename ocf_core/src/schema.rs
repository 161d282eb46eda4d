//! Primitive schemas and the reader/writer compatibility check.
//!
//! The container stores its writer schema as JSON under `avro.schema`. Only
//! primitive types are understood here; richer schema systems plug in through
//! [`crate::datum::DatumReader`] instead.

use std::fmt;

use serde_json::Value as Json;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
}

impl Schema {
    /// Parse `"string"` or `{"type": "string"}` style JSON.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Json = serde_json::from_str(json.trim())
            .map_err(|e| Error::SchemaResolution(format!("cannot parse schema {json:?}: {e}")))?;
        let name = match &value {
            Json::String(name) => name.as_str(),
            Json::Object(fields) => match fields.get("type") {
                Some(Json::String(name)) => name.as_str(),
                _ => {
                    return Err(Error::SchemaResolution(format!(
                        "schema object without a primitive \"type\": {json}"
                    )))
                }
            },
            _ => return Err(Error::SchemaResolution(format!("unsupported schema: {json}"))),
        };
        Self::from_name(name)
            .ok_or_else(|| Error::SchemaResolution(format!("unsupported schema type '{name}'")))
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Schema::Null,
            "boolean" => Schema::Boolean,
            "int" => Schema::Int,
            "long" => Schema::Long,
            "float" => Schema::Float,
            "double" => Schema::Double,
            "bytes" => Schema::Bytes,
            "string" => Schema::String,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Schema::Null => "null",
            Schema::Boolean => "boolean",
            Schema::Int => "int",
            Schema::Long => "long",
            Schema::Float => "float",
            Schema::Double => "double",
            Schema::Bytes => "bytes",
            Schema::String => "string",
        }
    }

    /// Canonical JSON form written to container headers.
    pub fn to_json(&self) -> String {
        format!("\"{}\"", self.name())
    }

    /// Whether data written with `writer` can be read as `self`.
    ///
    /// Identical types always match; numeric promotions widen only, and
    /// `bytes`/`string` are interchangeable.
    pub fn can_read(&self, writer: Schema) -> bool {
        use Schema::*;
        matches!(
            (writer, *self),
            (Int, Long | Float | Double)
                | (Long, Float | Double)
                | (Float, Double)
                | (Bytes, String)
                | (String, Bytes)
        ) || writer == *self
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(Schema::parse("\"string\"").unwrap(), Schema::String);
        assert_eq!(Schema::parse(r#"{"type": "long"}"#).unwrap(), Schema::Long);
        assert_eq!(Schema::parse("  \"bytes\"\n").unwrap(), Schema::Bytes);
    }

    #[test]
    fn test_parse_rejects_non_primitives() {
        for bad in [r#"{"type":"record","name":"R","fields":[]}"#, "[\"null\",\"string\"]", "string", "42"] {
            assert!(
                matches!(Schema::parse(bad), Err(Error::SchemaResolution(_))),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn test_json_form_reparses() {
        let s = Schema::Double;
        assert_eq!(s.to_json(), "\"double\"");
        assert_eq!(Schema::parse(&s.to_json()).unwrap(), s);
    }

    #[test]
    fn test_promotions() {
        assert!(Schema::Long.can_read(Schema::Int));
        assert!(Schema::Double.can_read(Schema::Float));
        assert!(Schema::String.can_read(Schema::Bytes));
        assert!(Schema::Bytes.can_read(Schema::String));
        assert!(Schema::Boolean.can_read(Schema::Boolean));
        assert!(!Schema::Int.can_read(Schema::Long));
        assert!(!Schema::Long.can_read(Schema::String));
        assert!(!Schema::Null.can_read(Schema::Boolean));
    }
}
