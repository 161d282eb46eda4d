//! Error taxonomy for container reading, writing, and split iteration.
//!
//! Every variant aborts the current split. Records handed out before the
//! error stay valid; nothing is retried here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure from the underlying input or sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad magic, truncated header, or malformed header metadata.
    #[error("invalid container format: {0}")]
    InvalidFormat(String),

    /// Sync marker mismatch, decompression failure, or record-count mismatch.
    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    /// Reader schema cannot read data written with the writer schema.
    #[error("schema resolution failed: {0}")]
    SchemaResolution(String),

    /// A required configuration key is absent.
    #[error("missing configuration: {0}")]
    MissingConfiguration(&'static str),

    /// A configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown codec '{0}'")]
    UnknownCodec(String),

    /// Compression failed while writing a block.
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// `next` was called with no records left.
    #[error("no more records")]
    Exhausted,

    #[error("reader or writer is closed")]
    Closed,
}

impl Error {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptBlock(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::InvalidFormat(msg.into())
    }
}

/// Result alias used throughout `ocf_core`.
pub type Result<T> = std::result::Result<T, Error>;
