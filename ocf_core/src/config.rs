//! Job configuration: schemas, output codec and block thresholds.
//!
//! Loaded from a flat property map (`ocf.schema.input.key = "string"`, ...)
//! or from JSON with the field names below. Required schemas are checked by
//! the accessors, before any file is touched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::NULL_CODEC;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::split::Slot;
use crate::sync::{FlushPolicy, DEFAULT_MAX_BLOCK_BYTES};
use crate::writer::WriterOptions;

pub const INPUT_KEY_SCHEMA: &str = "ocf.schema.input.key";
pub const INPUT_VALUE_SCHEMA: &str = "ocf.schema.input.value";
pub const OUTPUT_KEY_SCHEMA: &str = "ocf.schema.output.key";
pub const OUTPUT_VALUE_SCHEMA: &str = "ocf.schema.output.value";
/// Schemas of the intermediate records between the map and reduce stages.
pub const MAP_OUTPUT_KEY_SCHEMA: &str = "ocf.schema.mapoutput.key";
pub const MAP_OUTPUT_VALUE_SCHEMA: &str = "ocf.schema.mapoutput.value";
pub const OUTPUT_CODEC: &str = "ocf.output.codec";
pub const OUTPUT_CODEC_LEVEL: &str = "ocf.output.codec.level";
pub const MAX_BLOCK_BYTES: &str = "ocf.output.block.bytes";
pub const MAX_BLOCK_RECORDS: &str = "ocf.output.block.records";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub input_key_schema: Option<String>,
    pub input_value_schema: Option<String>,
    pub output_key_schema: Option<String>,
    pub output_value_schema: Option<String>,
    pub map_output_key_schema: Option<String>,
    pub map_output_value_schema: Option<String>,
    /// Codec name; `null` when unset.
    pub output_codec: Option<String>,
    pub output_codec_level: Option<i32>,
    pub max_block_bytes: Option<usize>,
    pub max_block_records: Option<u64>,
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfiguration(format!("{key} = {value:?} is not a number")))
}

fn parse_schema(key: &str, json: &str) -> Result<Schema> {
    Schema::parse(json).map_err(|e| Error::InvalidConfiguration(format!("{key}: {e}")))
}

impl JobConfig {
    /// Build from `ocf.*` properties. Unrelated keys are ignored.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| props.get(key).cloned();
        Ok(Self {
            input_key_schema: get(INPUT_KEY_SCHEMA),
            input_value_schema: get(INPUT_VALUE_SCHEMA),
            output_key_schema: get(OUTPUT_KEY_SCHEMA),
            output_value_schema: get(OUTPUT_VALUE_SCHEMA),
            map_output_key_schema: get(MAP_OUTPUT_KEY_SCHEMA),
            map_output_value_schema: get(MAP_OUTPUT_VALUE_SCHEMA),
            output_codec: get(OUTPUT_CODEC),
            output_codec_level: get(OUTPUT_CODEC_LEVEL)
                .map(|v| parse_num(OUTPUT_CODEC_LEVEL, &v))
                .transpose()?,
            max_block_bytes: get(MAX_BLOCK_BYTES)
                .map(|v| parse_num(MAX_BLOCK_BYTES, &v))
                .transpose()?,
            max_block_records: get(MAX_BLOCK_RECORDS)
                .map(|v| parse_num(MAX_BLOCK_RECORDS, &v))
                .transpose()?,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfiguration(format!("bad job config: {e}")))
    }

    pub fn set_input_schema(&mut self, slot: Slot, schema: Schema) -> &mut Self {
        let field = match slot {
            Slot::Key => &mut self.input_key_schema,
            Slot::Value => &mut self.input_value_schema,
        };
        *field = Some(schema.to_json());
        self
    }

    pub fn set_output_schema(&mut self, slot: Slot, schema: Schema) -> &mut Self {
        let field = match slot {
            Slot::Key => &mut self.output_key_schema,
            Slot::Value => &mut self.output_value_schema,
        };
        *field = Some(schema.to_json());
        self
    }

    pub fn set_map_output_schema(&mut self, slot: Slot, schema: Schema) -> &mut Self {
        let field = match slot {
            Slot::Key => &mut self.map_output_key_schema,
            Slot::Value => &mut self.map_output_value_schema,
        };
        *field = Some(schema.to_json());
        self
    }

    /// Reader schema for records exposed through `slot`.
    pub fn input_schema(&self, slot: Slot) -> Result<Schema> {
        let (key, value) = match slot {
            Slot::Key => (INPUT_KEY_SCHEMA, &self.input_key_schema),
            Slot::Value => (INPUT_VALUE_SCHEMA, &self.input_value_schema),
        };
        let json = value.as_deref().ok_or(Error::MissingConfiguration(key))?;
        parse_schema(key, json)
    }

    /// Writer schema for records written through `slot`.
    pub fn output_schema(&self, slot: Slot) -> Result<Schema> {
        let (key, value) = match slot {
            Slot::Key => (OUTPUT_KEY_SCHEMA, &self.output_key_schema),
            Slot::Value => (OUTPUT_VALUE_SCHEMA, &self.output_value_schema),
        };
        let json = value.as_deref().ok_or(Error::MissingConfiguration(key))?;
        parse_schema(key, json)
    }

    /// Schema of intermediate records in `slot`.
    pub fn map_output_schema(&self, slot: Slot) -> Result<Schema> {
        let (key, value) = match slot {
            Slot::Key => (MAP_OUTPUT_KEY_SCHEMA, &self.map_output_key_schema),
            Slot::Value => (MAP_OUTPUT_VALUE_SCHEMA, &self.map_output_value_schema),
        };
        let json = value.as_deref().ok_or(Error::MissingConfiguration(key))?;
        parse_schema(key, json)
    }

    pub fn output_codec(&self) -> &str {
        self.output_codec.as_deref().unwrap_or(NULL_CODEC)
    }

    pub fn flush_policy(&self) -> Result<FlushPolicy> {
        let max_block_bytes = self.max_block_bytes.unwrap_or(DEFAULT_MAX_BLOCK_BYTES);
        if max_block_bytes == 0 {
            return Err(Error::InvalidConfiguration(format!("{MAX_BLOCK_BYTES} must be positive")));
        }
        if self.max_block_records == Some(0) {
            return Err(Error::InvalidConfiguration(format!(
                "{MAX_BLOCK_RECORDS} must be positive"
            )));
        }
        Ok(FlushPolicy {
            max_block_bytes,
            max_block_records: self.max_block_records,
        })
    }

    pub fn writer_options(&self) -> Result<WriterOptions> {
        Ok(WriterOptions {
            flush_policy: self.flush_policy()?,
            ..Default::default()
        })
    }
}
