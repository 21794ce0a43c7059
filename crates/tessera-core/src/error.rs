//! Error types for all tessera operations.

use std::io;
use thiserror::Error;

/// Top-level error type for tessera operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Violations of the tree wire format, raised while reading or writing.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid token marker {marker:#04x} at byte {position}")]
    InvalidMarker { marker: u8, position: u64 },

    #[error("expected {expected} at position {position}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: &'static str,
        position: u64,
    },

    #[error("unknown property '{name}' at position {position}")]
    UnknownProperty { name: String, position: u64 },

    #[error("block element kind mismatch: expected {expected}, found {found}")]
    BlockKindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid block element kind tag: {0}")]
    InvalidBlockKind(u8),

    #[error("varint longer than 64 bits at byte {position}")]
    InvalidVarint { position: u64 },

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("invalid char code point: {0:#x}")]
    InvalidChar(u32),

    #[error("number {value} out of range for {target}")]
    NumberOutOfRange { value: String, target: &'static str },

    #[error("checksum mismatch: stored={stored:#018x}, computed={computed:#018x}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    #[error("unexpected end of stream")]
    Truncated,

    #[error("unbalanced tree: {open} container(s) still open")]
    Unbalanced { open: usize },

    #[error("corrupt column data: {0}")]
    Corrupt(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Construction-time and type errors; these are programmer errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unsupported field type: {0}")]
    UnsupportedType(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },

    #[error("column already exists: {table}.{column}")]
    ColumnAlreadyExists { table: String, column: String },

    #[error("column {table}.{column} is not of the requested type")]
    ColumnTypeMismatch { table: String, column: String },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors from explicit positional or keyed access by a caller.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("key not found: {key} (available keys: [{available}])")]
    KeyNotFound { key: String, available: String },

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: i64, len: usize },

    #[error(
        "invalid reference in {table}.{column} row {row}: {value} is not a row of '{target}'"
    )]
    InvalidReference {
        table: String,
        column: String,
        row: usize,
        value: i32,
        target: String,
    },

    #[error("stale row handle: table was compacted since the handle was issued")]
    StaleRow,

    #[error("row handle belongs to a different table")]
    WrongTable,
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::Format(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
