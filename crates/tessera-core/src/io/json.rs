//! JSON encoding of the tree protocol.
//!
//! Objects and arrays map directly onto JSON; block arrays become arrays of
//! numbers. Non-finite floats have no JSON form and are written as `null`,
//! which reads back as NaN. Reader positions are token ordinals, not bytes.

use std::io::{Read, Write};

use serde_json::{Map, Number, Value as JsonValue};

use crate::error::{FormatError, Result};

use super::block::{Block, BlockKind, BlockVec};
use super::settings::TreeSerializationSettings;
use super::tree::{SizeUnit, TreeReader, TreeToken, TreeWriter, unexpected};

enum Frame {
    Object {
        map: Map<String, JsonValue>,
        pending: Option<String>,
    },
    Array(Vec<JsonValue>),
}

/// Builds a JSON document in memory and writes it on `finish`.
pub struct JsonTreeWriter<W: Write> {
    out: W,
    stack: Vec<Frame>,
    root: Option<JsonValue>,
    pretty: bool,
}

impl<W: Write> JsonTreeWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            stack: Vec::new(),
            root: None,
            pretty: true,
        }
    }

    /// Emit compact JSON instead of indented JSON.
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn push(&mut self, value: JsonValue) -> Result<()> {
        match self.stack.last_mut() {
            None => {
                self.root = Some(value);
                Ok(())
            }
            Some(Frame::Array(items)) => {
                items.push(value);
                Ok(())
            }
            Some(Frame::Object { map, pending }) => {
                let name = pending.take().ok_or(FormatError::UnexpectedToken {
                    expected: TreeToken::PropertyName.name(),
                    found: "value",
                    position: map.len() as u64,
                })?;
                map.insert(name, value);
                Ok(())
            }
        }
    }
}

fn float_value(value: f64) -> JsonValue {
    Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

fn block_to_json(block: Block<'_>) -> JsonValue {
    let items = match block {
        Block::U8(v) => v.iter().map(|x| JsonValue::from(*x)).collect(),
        Block::I8(v) => v.iter().map(|x| JsonValue::from(*x)).collect(),
        Block::U16(v) => v.iter().map(|x| JsonValue::from(*x)).collect(),
        Block::I16(v) => v.iter().map(|x| JsonValue::from(*x)).collect(),
        Block::U32(v) => v.iter().map(|x| JsonValue::from(*x)).collect(),
        Block::I32(v) => v.iter().map(|x| JsonValue::from(*x)).collect(),
        Block::U64(v) => v.iter().map(|x| JsonValue::from(*x)).collect(),
        Block::I64(v) => v.iter().map(|x| JsonValue::from(*x)).collect(),
        Block::F32(v) => v.iter().map(|x| float_value(f64::from(*x))).collect(),
        Block::F64(v) => v.iter().map(|x| float_value(*x)).collect(),
        Block::Char(v) => v.iter().map(|x| JsonValue::from(u32::from(*x))).collect(),
    };
    JsonValue::Array(items)
}

impl<W: Write> TreeWriter for JsonTreeWriter<W> {
    fn start_object(&mut self) -> Result<()> {
        self.stack.push(Frame::Object {
            map: Map::new(),
            pending: None,
        });
        Ok(())
    }

    fn end_object(&mut self) -> Result<()> {
        match self.stack.pop() {
            Some(Frame::Object { map, .. }) => self.push(JsonValue::Object(map)),
            _ => Err(FormatError::Unbalanced { open: self.stack.len() }.into()),
        }
    }

    fn start_array(&mut self) -> Result<()> {
        self.stack.push(Frame::Array(Vec::new()));
        Ok(())
    }

    fn end_array(&mut self) -> Result<()> {
        match self.stack.pop() {
            Some(Frame::Array(items)) => self.push(JsonValue::Array(items)),
            _ => Err(FormatError::Unbalanced { open: self.stack.len() }.into()),
        }
    }

    fn property_name(&mut self, name: &str) -> Result<()> {
        match self.stack.last_mut() {
            Some(Frame::Object { pending, .. }) if pending.is_none() => {
                *pending = Some(name.to_string());
                Ok(())
            }
            _ => Err(FormatError::UnexpectedToken {
                expected: "value",
                found: TreeToken::PropertyName.name(),
                position: 0,
            }
            .into()),
        }
    }

    fn write_str(&mut self, value: &str) -> Result<()> {
        self.push(JsonValue::String(value.to_string()))
    }

    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.push(JsonValue::from(value))
    }

    fn write_f64(&mut self, value: f64) -> Result<()> {
        self.push(float_value(value))
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.push(JsonValue::Bool(value))
    }

    fn write_null(&mut self) -> Result<()> {
        self.push(JsonValue::Null)
    }

    fn write_block(&mut self, block: Block<'_>) -> Result<()> {
        self.push(block_to_json(block))
    }

    fn finish(&mut self) -> Result<()> {
        if !self.stack.is_empty() {
            return Err(FormatError::Unbalanced { open: self.stack.len() }.into());
        }
        let Some(root) = self.root.take() else {
            return Ok(());
        };
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, &root).map_err(FormatError::from)?;
        } else {
            serde_json::to_writer(&mut self.out, &root).map_err(FormatError::from)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum JsonToken {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    Property(String),
    String(String),
    Number(Number),
    Bool(bool),
    Null,
}

impl JsonToken {
    fn kind(&self) -> TreeToken {
        match self {
            JsonToken::StartObject => TreeToken::StartObject,
            JsonToken::EndObject => TreeToken::EndObject,
            JsonToken::StartArray => TreeToken::StartArray,
            JsonToken::EndArray => TreeToken::EndArray,
            JsonToken::Property(_) => TreeToken::PropertyName,
            JsonToken::String(_) => TreeToken::String,
            JsonToken::Number(n) if n.is_f64() => TreeToken::Float,
            JsonToken::Number(_) => TreeToken::Integer,
            JsonToken::Bool(_) => TreeToken::Boolean,
            JsonToken::Null => TreeToken::Null,
        }
    }
}

fn flatten(value: JsonValue, out: &mut Vec<JsonToken>) {
    match value {
        JsonValue::Null => out.push(JsonToken::Null),
        JsonValue::Bool(b) => out.push(JsonToken::Bool(b)),
        JsonValue::Number(n) => out.push(JsonToken::Number(n)),
        JsonValue::String(s) => out.push(JsonToken::String(s)),
        JsonValue::Array(items) => {
            out.push(JsonToken::StartArray);
            for item in items {
                flatten(item, out);
            }
            out.push(JsonToken::EndArray);
        }
        JsonValue::Object(map) => {
            out.push(JsonToken::StartObject);
            for (name, item) in map {
                out.push(JsonToken::Property(name));
                flatten(item, out);
            }
            out.push(JsonToken::EndObject);
        }
    }
}

/// Reads a JSON document written by [`JsonTreeWriter`].
pub struct JsonTreeReader {
    tokens: Vec<JsonToken>,
    position: usize,
    settings: TreeSerializationSettings,
}

impl JsonTreeReader {
    pub fn new<R: Read>(input: R, settings: TreeSerializationSettings) -> Result<Self> {
        let document: JsonValue = serde_json::from_reader(input).map_err(FormatError::from)?;
        Ok(Self::from_value(document, settings))
    }

    pub fn from_value(document: JsonValue, settings: TreeSerializationSettings) -> Self {
        let mut tokens = Vec::new();
        flatten(document, &mut tokens);
        Self {
            tokens,
            position: 0,
            settings,
        }
    }

    fn current(&self) -> Option<&JsonToken> {
        self.tokens.get(self.position)
    }

    fn take(&mut self) -> Option<JsonToken> {
        let token = self.tokens.get_mut(self.position)?;
        let token = std::mem::replace(token, JsonToken::Null);
        self.position += 1;
        Some(token)
    }

    fn mismatch(&self, expected: TreeToken) -> FormatError {
        unexpected(self, expected)
    }

    fn number(&mut self) -> Result<Number> {
        match self.current() {
            Some(JsonToken::Number(n)) => {
                let n = n.clone();
                self.position += 1;
                Ok(n)
            }
            _ => Err(self.mismatch(TreeToken::Integer).into()),
        }
    }
}

type FormatResult<T> = std::result::Result<T, FormatError>;

fn out_of_range(n: &Number, target: &'static str) -> FormatError {
    FormatError::NumberOutOfRange {
        value: n.to_string(),
        target,
    }
}

fn integer_element<T>(item: Option<&Number>, target: &'static str) -> FormatResult<T>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let Some(n) = item else {
        return Err(FormatError::NumberOutOfRange {
            value: "null".to_string(),
            target,
        });
    };
    n.as_i64()
        .and_then(|v| T::try_from(v).ok())
        .or_else(|| n.as_u64().and_then(|v| T::try_from(v).ok()))
        .ok_or_else(|| out_of_range(n, target))
}

fn float_element(item: Option<&Number>) -> f64 {
    item.and_then(Number::as_f64).unwrap_or(f64::NAN)
}

fn block_from_numbers(kind: BlockKind, items: &[Option<Number>]) -> FormatResult<BlockVec> {
    macro_rules! ints {
        ($variant:ident, $ty:ty) => {
            BlockVec::$variant(
                items
                    .iter()
                    .map(|n| integer_element::<$ty>(n.as_ref(), kind.name()))
                    .collect::<FormatResult<_>>()?,
            )
        };
    }
    Ok(match kind {
        BlockKind::U8 => ints!(U8, u8),
        BlockKind::I8 => ints!(I8, i8),
        BlockKind::U16 => ints!(U16, u16),
        BlockKind::I16 => ints!(I16, i16),
        BlockKind::U32 => ints!(U32, u32),
        BlockKind::I32 => ints!(I32, i32),
        BlockKind::U64 => ints!(U64, u64),
        BlockKind::I64 => ints!(I64, i64),
        BlockKind::F32 => BlockVec::F32(items.iter().map(|n| float_element(n.as_ref()) as f32).collect()),
        BlockKind::F64 => BlockVec::F64(items.iter().map(|n| float_element(n.as_ref())).collect()),
        BlockKind::Char => {
            let chars = items
                .iter()
                .map(|n| {
                    let point = integer_element::<u32>(n.as_ref(), "char")?;
                    char::from_u32(point).ok_or(FormatError::InvalidChar(point))
                })
                .collect::<FormatResult<_>>()?;
            BlockVec::Char(chars)
        }
    })
}

impl TreeReader for JsonTreeReader {
    fn settings(&self) -> &TreeSerializationSettings {
        &self.settings
    }

    fn token(&self) -> TreeToken {
        self.current().map_or(TreeToken::None, JsonToken::kind)
    }

    fn token_position(&self) -> u64 {
        self.position as u64
    }

    fn position_unit(&self) -> SizeUnit {
        SizeUnit::Tokens
    }

    fn expect(&mut self, token: TreeToken) -> Result<()> {
        if self.token() != token {
            return Err(self.mismatch(token).into());
        }
        self.position += 1;
        Ok(())
    }

    fn read_property_name(&mut self) -> Result<String> {
        if self.token() != TreeToken::PropertyName {
            return Err(self.mismatch(TreeToken::PropertyName).into());
        }
        match self.take() {
            Some(JsonToken::Property(name)) => Ok(name),
            _ => Err(FormatError::Truncated.into()),
        }
    }

    fn read_string(&mut self) -> Result<String> {
        if self.token() != TreeToken::String {
            return Err(self.mismatch(TreeToken::String).into());
        }
        match self.take() {
            Some(JsonToken::String(value)) => Ok(value),
            _ => Err(FormatError::Truncated.into()),
        }
    }

    fn read_i64(&mut self) -> Result<i64> {
        let n = self.number()?;
        Ok(n.as_i64().ok_or_else(|| out_of_range(&n, "i64"))?)
    }

    fn read_f64(&mut self) -> Result<f64> {
        if self.token() == TreeToken::Null {
            self.position += 1;
            return Ok(f64::NAN);
        }
        let n = self.number()?;
        Ok(n.as_f64().ok_or_else(|| out_of_range(&n, "f64"))?)
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.current() {
            Some(JsonToken::Bool(b)) => {
                let b = *b;
                self.position += 1;
                Ok(b)
            }
            _ => Err(self.mismatch(TreeToken::Boolean).into()),
        }
    }

    fn read_block(&mut self, kind: BlockKind) -> Result<BlockVec> {
        if self.token() != TreeToken::StartArray {
            return Err(self.mismatch(TreeToken::BlockArray).into());
        }
        self.position += 1;
        let mut items = Vec::new();
        loop {
            match self.current() {
                Some(JsonToken::EndArray) => {
                    self.position += 1;
                    break;
                }
                Some(JsonToken::Number(n)) => items.push(Some(n.clone())),
                Some(JsonToken::Null) => items.push(None),
                Some(_) => return Err(self.mismatch(TreeToken::Integer).into()),
                None => return Err(FormatError::Truncated.into()),
            }
            self.position += 1;
        }
        Ok(block_from_numbers(kind, &items)?)
    }

    fn skip(&mut self) -> Result<()> {
        let mut open = 0usize;
        loop {
            match self.token() {
                TreeToken::StartObject | TreeToken::StartArray => open += 1,
                TreeToken::EndObject | TreeToken::EndArray => {
                    open = open
                        .checked_sub(1)
                        .ok_or_else(|| self.mismatch(TreeToken::StartObject))?;
                }
                TreeToken::None => return Err(FormatError::Truncated.into()),
                _ => {}
            }
            self.position += 1;
            if open == 0 {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_builds_document() {
        let mut buf = Vec::new();
        let mut writer = JsonTreeWriter::new(&mut buf).compact();
        writer.start_object().unwrap();
        writer.property_name("Count").unwrap();
        writer.write_i64(2).unwrap();
        writer.property_name("Values").unwrap();
        writer.write_block(Block::F64(&[1.5, f64::INFINITY])).unwrap();
        writer.end_object().unwrap();
        writer.finish().unwrap();
        drop(writer);

        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, r#"{"Count":2,"Values":[1.5,null]}"#);
    }

    #[test]
    fn test_reader_blocks_and_scalars() {
        let doc = r#"{"Name": "Adam", "Bits": [1, 255], "Ratio": 2, "Flag": false}"#;
        let mut reader = JsonTreeReader::new(doc.as_bytes(), Default::default()).unwrap();
        reader.expect(TreeToken::StartObject).unwrap();
        assert_eq!(reader.read_property_name().unwrap(), "Bits");
        assert_eq!(
            reader.read_block(BlockKind::U8).unwrap(),
            BlockVec::U8(vec![1, 255])
        );
        assert_eq!(reader.read_property_name().unwrap(), "Flag");
        assert!(!reader.read_bool().unwrap());
        assert_eq!(reader.read_property_name().unwrap(), "Name");
        assert_eq!(reader.read_string().unwrap(), "Adam");
        assert_eq!(reader.read_property_name().unwrap(), "Ratio");
        assert_eq!(reader.read_f64().unwrap(), 2.0);
        reader.expect(TreeToken::EndObject).unwrap();
        assert_eq!(reader.token(), TreeToken::None);
    }

    #[test]
    fn test_block_range_checked() {
        let doc = r#"[1, 256]"#;
        let mut reader = JsonTreeReader::new(doc.as_bytes(), Default::default()).unwrap();
        assert!(reader.read_block(BlockKind::U8).is_err());
    }

    #[test]
    fn test_char_block_rejects_surrogates() {
        let mut reader = JsonTreeReader::new("[65, 55296]".as_bytes(), Default::default()).unwrap();
        assert!(matches!(
            reader.read_block(BlockKind::Char),
            Err(crate::error::Error::Format(FormatError::InvalidChar(55296)))
        ));
    }

    #[test]
    fn test_mismatch_reports_token_ordinal() {
        let doc = r#"{"Name": "Scott"}"#;
        let mut reader = JsonTreeReader::new(doc.as_bytes(), Default::default()).unwrap();
        reader.expect(TreeToken::StartObject).unwrap();
        assert_eq!(reader.read_property_name().unwrap(), "Name");
        match reader.read_i64() {
            Err(crate::error::Error::Format(FormatError::UnexpectedToken {
                expected,
                found,
                position,
            })) => {
                assert_eq!(expected, "integer");
                assert_eq!(found, "string");
                assert_eq!(position, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_end() {
        let mut writer = JsonTreeWriter::new(Vec::new());
        writer.start_array().unwrap();
        assert!(writer.end_object().is_err());
    }
}
