//! The tree protocol: tokens, writer/reader contracts and the helpers every
//! serializable structure is built from.
//!
//! A structure writes itself as an object of named properties. Reading
//! dispatches on property names through [`read_object`](dyn TreeReader::read_object);
//! names the structure does not handle are skipped, or rejected when the
//! reader's settings are strict.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FormatError, Result};

use super::block::{Block, BlockElement, BlockKind, BlockVec};
use super::settings::TreeSerializationSettings;

/// What a reader's [`token_position`](TreeReader::token_position) counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeUnit {
    #[default]
    Bytes,
    Tokens,
}

/// The kind of token a reader is positioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeToken {
    /// End of stream.
    None,
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    PropertyName,
    String,
    Integer,
    Float,
    Boolean,
    Null,
    BlockArray,
}

impl TreeToken {
    pub fn name(self) -> &'static str {
        match self {
            TreeToken::None => "end of stream",
            TreeToken::StartObject => "start of object",
            TreeToken::EndObject => "end of object",
            TreeToken::StartArray => "start of array",
            TreeToken::EndArray => "end of array",
            TreeToken::PropertyName => "property name",
            TreeToken::String => "string",
            TreeToken::Integer => "integer",
            TreeToken::Float => "float",
            TreeToken::Boolean => "boolean",
            TreeToken::Null => "null",
            TreeToken::BlockArray => "block array",
        }
    }
}

/// Sink for a tree of tokens.
pub trait TreeWriter {
    fn start_object(&mut self) -> Result<()>;
    fn end_object(&mut self) -> Result<()>;
    fn start_array(&mut self) -> Result<()>;
    fn end_array(&mut self) -> Result<()>;
    fn property_name(&mut self, name: &str) -> Result<()>;
    fn write_str(&mut self, value: &str) -> Result<()>;
    fn write_i64(&mut self, value: i64) -> Result<()>;
    fn write_f64(&mut self, value: f64) -> Result<()>;
    fn write_bool(&mut self, value: bool) -> Result<()>;
    fn write_null(&mut self) -> Result<()>;
    fn write_block(&mut self, block: Block<'_>) -> Result<()>;

    /// Complete the stream. Fails if any object or array is still open.
    fn finish(&mut self) -> Result<()>;
}

/// Source of a tree of tokens, positioned on one current token.
pub trait TreeReader {
    fn settings(&self) -> &TreeSerializationSettings;

    fn token(&self) -> TreeToken;

    /// Stream offset of the current token, counted in [`position_unit`](Self::position_unit).
    fn token_position(&self) -> u64;

    fn position_unit(&self) -> SizeUnit {
        SizeUnit::Bytes
    }

    /// Consume the current token, which must be `token`.
    fn expect(&mut self, token: TreeToken) -> Result<()>;

    fn read_property_name(&mut self) -> Result<String>;
    fn read_string(&mut self) -> Result<String>;
    fn read_i64(&mut self) -> Result<i64>;
    /// Accepts integer tokens as well as floats.
    fn read_f64(&mut self) -> Result<f64>;
    fn read_bool(&mut self) -> Result<bool>;
    fn read_block(&mut self, kind: BlockKind) -> Result<BlockVec>;

    /// Consume the current value, including everything nested inside it.
    fn skip(&mut self) -> Result<()>;

    /// Called by `read_object` once a property's name has been consumed.
    fn begin_property(&mut self, _name: &str) {}

    /// Called by `read_object` once a property's value has been consumed.
    fn end_property(&mut self) {}
}

/// A structure that can write itself to, and read itself from, a tree.
pub trait TreeSerializable {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()>;

    /// Replace the contents of `self` with what the reader yields.
    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()>;
}

pub(crate) fn unexpected(reader: &dyn TreeReader, expected: TreeToken) -> FormatError {
    FormatError::UnexpectedToken {
        expected: expected.name(),
        found: reader.token().name(),
        position: reader.token_position(),
    }
}

impl dyn TreeWriter + '_ {
    pub fn write_property<T: TreeSerializable + ?Sized>(&mut self, name: &str, item: &T) -> Result<()> {
        self.property_name(name)?;
        item.write_tree(self)
    }

    pub fn write_i64_property(&mut self, name: &str, value: i64) -> Result<()> {
        self.property_name(name)?;
        self.write_i64(value)
    }

    pub fn write_str_property(&mut self, name: &str, value: &str) -> Result<()> {
        self.property_name(name)?;
        self.write_str(value)
    }

    pub fn write_block_property<E: BlockElement>(&mut self, name: &str, values: &[E]) -> Result<()> {
        self.property_name(name)?;
        self.write_block(E::as_block(values))
    }

    /// Write an integer-keyed dictionary as `[key, value, key, value, ...]`.
    pub fn write_int_dictionary<V, I, F>(&mut self, entries: I, mut write_value: F) -> Result<()>
    where
        I: IntoIterator<Item = (i64, V)>,
        F: FnMut(&mut dyn TreeWriter, V) -> Result<()>,
    {
        self.start_array()?;
        for (key, value) in entries {
            self.write_i64(key)?;
            write_value(&mut *self, value)?;
        }
        self.end_array()
    }
}

impl dyn TreeReader + '_ {
    /// Read an object, handing each property to `handler`.
    ///
    /// `handler` returns `false` for names it does not recognize; those are
    /// skipped, or rejected under strict settings.
    pub fn read_object<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(&mut dyn TreeReader, &str) -> Result<bool>,
    {
        self.expect(TreeToken::StartObject)?;
        while self.token() == TreeToken::PropertyName {
            let position = self.token_position();
            let name = self.read_property_name()?;
            self.begin_property(&name);
            if !handler(&mut *self, &name)? {
                if self.settings().strict {
                    return Err(FormatError::UnknownProperty { name, position }.into());
                }
                debug!(property = %name, position, "skipping unknown property");
                self.skip()?;
            }
            self.end_property();
        }
        self.expect(TreeToken::EndObject)
    }

    /// Read an array, calling `element` once per item.
    pub fn read_array<F>(&mut self, mut element: F) -> Result<()>
    where
        F: FnMut(&mut dyn TreeReader) -> Result<()>,
    {
        self.expect(TreeToken::StartArray)?;
        while self.token() != TreeToken::EndArray {
            if self.token() == TreeToken::None {
                return Err(FormatError::Truncated.into());
            }
            element(&mut *self)?;
        }
        self.expect(TreeToken::EndArray)
    }

    /// Read an integer-keyed dictionary written by `write_int_dictionary`.
    pub fn read_int_dictionary<F>(&mut self, mut entry: F) -> Result<()>
    where
        F: FnMut(&mut dyn TreeReader, i64) -> Result<()>,
    {
        self.read_array(|reader| {
            let key = reader.read_i64()?;
            entry(reader, key)
        })
    }

    pub fn read_block_of<E: BlockElement>(&mut self) -> Result<Vec<E>> {
        let block = self.read_block(E::KIND)?;
        Ok(E::from_block(block)?)
    }

    pub fn read_usize(&mut self) -> Result<usize> {
        let position = self.token_position();
        let value = self.read_i64()?;
        usize::try_from(value).map_err(|_| {
            FormatError::NumberOutOfRange {
                value: format!("{value} at position {position}"),
                target: "usize",
            }
            .into()
        })
    }
}
