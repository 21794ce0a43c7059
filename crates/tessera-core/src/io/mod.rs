//! Self-describing tree serialization.
//!
//! Every column, table and database writes itself as an object of named
//! properties through [`TreeWriter`] and reads itself back through
//! [`TreeReader`]. Two encodings exist: a compact checksummed binary format
//! and JSON.

pub mod binary;
pub mod block;
pub mod diagnostics;
pub mod json;
pub mod settings;
pub mod tree;

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};

pub use block::{Block, BlockElement, BlockKind, BlockVec};
pub use diagnostics::{DiagnosticsReader, TreeDiagnostics};
pub use settings::TreeSerializationSettings;
pub use tree::{SizeUnit, TreeReader, TreeSerializable, TreeToken, TreeWriter};

use binary::{BinaryTreeReader, BinaryTreeWriter};
use json::{JsonTreeReader, JsonTreeWriter};

/// Encoding of a serialized tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeFormat {
    #[default]
    Binary,
    Json,
}

impl TreeFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            TreeFormat::Binary => "tsoa",
            TreeFormat::Json => "json",
        }
    }

    pub fn writer<'w, W: Write + 'w>(self, out: W) -> Result<Box<dyn TreeWriter + 'w>> {
        Ok(match self {
            TreeFormat::Binary => Box::new(BinaryTreeWriter::new(out)?),
            TreeFormat::Json => Box::new(JsonTreeWriter::new(out)),
        })
    }

    pub fn reader<'r, R: Read + 'r>(
        self,
        input: R,
        settings: TreeSerializationSettings,
    ) -> Result<Box<dyn TreeReader + 'r>> {
        Ok(match self {
            TreeFormat::Binary => Box::new(BinaryTreeReader::new(input, settings)?),
            TreeFormat::Json => Box::new(JsonTreeReader::new(input, settings)?),
        })
    }
}

/// Write `item` as one complete stream.
pub fn write_to<T, W>(item: &T, format: TreeFormat, out: W) -> Result<()>
where
    T: TreeSerializable + ?Sized,
    W: Write,
{
    let mut writer = format.writer(out)?;
    item.write_tree(&mut *writer)?;
    writer.finish()
}

/// Replace the contents of `item` with one complete stream.
pub fn read_from<T, R>(
    item: &mut T,
    format: TreeFormat,
    input: R,
    settings: &TreeSerializationSettings,
) -> Result<()>
where
    T: TreeSerializable + ?Sized,
    R: Read,
{
    let mut reader = format.reader(input, *settings)?;
    item.read_tree(&mut *reader)?;
    expect_end(&*reader)
}

pub(crate) fn expect_end(reader: &dyn TreeReader) -> Result<()> {
    if reader.token() != TreeToken::None {
        return Err(FormatError::UnexpectedToken {
            expected: TreeToken::None.name(),
            found: reader.token().name(),
            position: reader.token_position(),
        }
        .into());
    }
    Ok(())
}

pub fn to_bytes<T: TreeSerializable + ?Sized>(item: &T, format: TreeFormat) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_to(item, format, &mut buf)?;
    Ok(buf)
}

pub fn from_bytes<T: TreeSerializable + ?Sized>(
    item: &mut T,
    format: TreeFormat,
    bytes: &[u8],
    settings: &TreeSerializationSettings,
) -> Result<()> {
    read_from(item, format, bytes, settings)
}
