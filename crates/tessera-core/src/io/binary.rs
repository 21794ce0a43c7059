//! Compact binary encoding of the tree protocol.
//!
//! Stream layout:
//! ```text
//! [0..4]    magic: "TSOA"
//! [4..8]    version: u32 (1) little-endian
//! [8..n]    token stream, exactly one root value
//! [n..n+8]  xxhash64 checksum (of bytes 0..n) little-endian
//! ```
//!
//! Token encoding, one marker byte followed by its payload:
//! ```text
//! 0x01 StartObject     0x02 EndObject
//! 0x03 StartArray      0x04 EndArray
//! 0x05 PropertyName    varint byte length, UTF-8 bytes
//! 0x06 String          varint byte length, UTF-8 bytes
//! 0x07 Integer         zig-zag varint
//! 0x08 Float           f64 little-endian
//! 0x09 True            0x0A False
//! 0x0B Null
//! 0x0C Block           element kind u8, varint element count, packed elements
//! ```

use std::io::{Read, Write};

use xxhash_rust::xxh64::Xxh64;

use crate::error::{FormatError, Result};

use super::block::{Block, BlockKind, BlockVec};
use super::settings::TreeSerializationSettings;
use super::tree::{TreeReader, TreeToken, TreeWriter, unexpected};

/// Magic bytes identifying a tessera binary stream.
pub const MAGIC: &[u8; 4] = b"TSOA";

/// Current binary format version.
pub const VERSION: u32 = 1;

/// Size of the header preceding the token stream.
pub const HEADER_SIZE: usize = 8;

/// Size of the checksum trailer.
pub const TRAILER_SIZE: usize = 8;

const START_OBJECT: u8 = 0x01;
const END_OBJECT: u8 = 0x02;
const START_ARRAY: u8 = 0x03;
const END_ARRAY: u8 = 0x04;
const PROPERTY_NAME: u8 = 0x05;
const STRING: u8 = 0x06;
const INTEGER: u8 = 0x07;
const FLOAT: u8 = 0x08;
const TRUE: u8 = 0x09;
const FALSE: u8 = 0x0A;
const NULL: u8 = 0x0B;
const BLOCK: u8 = 0x0C;

/// Longest LEB128 encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

pub(crate) fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub(crate) fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub(crate) fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Writes the binary encoding to any `Write`.
pub struct BinaryTreeWriter<W: Write> {
    out: W,
    hasher: Xxh64,
    written: u64,
    depth: usize,
    scratch: Vec<u8>,
    finished: bool,
}

impl<W: Write> BinaryTreeWriter<W> {
    /// Create a writer and emit the stream header.
    pub fn new(out: W) -> Result<Self> {
        let mut writer = Self {
            out,
            hasher: Xxh64::new(0),
            written: 0,
            depth: 0,
            scratch: Vec::with_capacity(64),
            finished: false,
        };
        writer.scratch.extend_from_slice(MAGIC);
        writer.scratch.extend_from_slice(&VERSION.to_le_bytes());
        writer.flush_scratch()?;
        Ok(writer)
    }

    /// Bytes written so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn flush_scratch(&mut self) -> Result<()> {
        self.out.write_all(&self.scratch)?;
        self.hasher.update(&self.scratch);
        self.written += self.scratch.len() as u64;
        self.scratch.clear();
        Ok(())
    }

    fn marker(&mut self, marker: u8) -> Result<()> {
        self.scratch.push(marker);
        self.flush_scratch()
    }

    fn text(&mut self, marker: u8, value: &str) -> Result<()> {
        self.scratch.push(marker);
        encode_varint(value.len() as u64, &mut self.scratch);
        self.scratch.extend_from_slice(value.as_bytes());
        self.flush_scratch()
    }

    fn close(&mut self, marker: u8) -> Result<()> {
        self.depth = self
            .depth
            .checked_sub(1)
            .ok_or(FormatError::Unbalanced { open: 0 })?;
        self.marker(marker)
    }
}

impl<W: Write> TreeWriter for BinaryTreeWriter<W> {
    fn start_object(&mut self) -> Result<()> {
        self.depth += 1;
        self.marker(START_OBJECT)
    }

    fn end_object(&mut self) -> Result<()> {
        self.close(END_OBJECT)
    }

    fn start_array(&mut self) -> Result<()> {
        self.depth += 1;
        self.marker(START_ARRAY)
    }

    fn end_array(&mut self) -> Result<()> {
        self.close(END_ARRAY)
    }

    fn property_name(&mut self, name: &str) -> Result<()> {
        self.text(PROPERTY_NAME, name)
    }

    fn write_str(&mut self, value: &str) -> Result<()> {
        self.text(STRING, value)
    }

    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.scratch.push(INTEGER);
        encode_varint(zigzag(value), &mut self.scratch);
        self.flush_scratch()
    }

    fn write_f64(&mut self, value: f64) -> Result<()> {
        self.scratch.push(FLOAT);
        self.scratch.extend_from_slice(&value.to_le_bytes());
        self.flush_scratch()
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.marker(if value { TRUE } else { FALSE })
    }

    fn write_null(&mut self) -> Result<()> {
        self.marker(NULL)
    }

    fn write_block(&mut self, block: Block<'_>) -> Result<()> {
        self.scratch.push(BLOCK);
        self.scratch.push(block.kind().tag());
        encode_varint(block.len() as u64, &mut self.scratch);
        block.encode_le(&mut self.scratch);
        self.flush_scratch()
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if self.depth != 0 {
            return Err(FormatError::Unbalanced { open: self.depth }.into());
        }
        let checksum = self.hasher.digest();
        self.out.write_all(&checksum.to_le_bytes())?;
        self.written += TRAILER_SIZE as u64;
        self.out.flush()?;
        self.finished = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct HashingReader<R> {
    inner: R,
    hasher: Xxh64,
    position: u64,
}

impl<R: Read> HashingReader<R> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FormatError::Truncated.into()
            } else {
                crate::error::Error::from(e)
            }
        })?;
        self.hasher.update(buf);
        self.position += buf.len() as u64;
        Ok(())
    }

    fn byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    /// Read `len` bytes without trusting `len` for the allocation size.
    fn bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut self.inner).take(len).read_to_end(&mut buf)?;
        if (buf.len() as u64) < len {
            return Err(FormatError::Truncated.into());
        }
        self.hasher.update(&buf);
        self.position += len;
        Ok(buf)
    }

    fn varint(&mut self) -> Result<u64> {
        let start = self.position;
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.byte()?;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(FormatError::InvalidVarint { position: start }.into())
    }
}

/// Reads the binary encoding from any `Read`.
pub struct BinaryTreeReader<R: Read> {
    input: HashingReader<R>,
    settings: TreeSerializationSettings,
    token: TreeToken,
    token_start: u64,
    depth: usize,
    started: bool,
    text: String,
    integer: i64,
    float: f64,
    boolean: bool,
    pending_block: Option<(BlockKind, u64)>,
}

impl<R: Read> BinaryTreeReader<R> {
    /// Validate the stream header and position the reader on the root token.
    pub fn new(input: R, settings: TreeSerializationSettings) -> Result<Self> {
        let mut reader = Self {
            input: HashingReader {
                inner: input,
                hasher: Xxh64::new(0),
                position: 0,
            },
            settings,
            token: TreeToken::None,
            token_start: 0,
            depth: 0,
            started: false,
            text: String::new(),
            integer: 0,
            float: 0.0,
            boolean: false,
            pending_block: None,
        };

        let mut header = [0u8; HEADER_SIZE];
        reader.input.fill(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(FormatError::InvalidMagic.into());
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&header[4..8]);
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion(version).into());
        }

        reader.advance()?;
        Ok(reader)
    }

    fn mismatch(&self, expected: TreeToken) -> FormatError {
        unexpected(self, expected)
    }

    fn require(&self, expected: TreeToken) -> Result<()> {
        if self.token != expected {
            return Err(self.mismatch(expected).into());
        }
        Ok(())
    }

    fn read_text(&mut self) -> Result<String> {
        let len = self.input.varint()?;
        let bytes = self.input.bytes(len)?;
        String::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8.into())
    }

    fn read_trailer(&mut self) -> Result<()> {
        let computed = self.input.hasher.digest();
        let mut raw = [0u8; TRAILER_SIZE];
        self.input.inner.read_exact(&mut raw).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FormatError::Truncated.into()
            } else {
                crate::error::Error::from(e)
            }
        })?;
        let stored = u64::from_le_bytes(raw);
        if self.settings.verify_checksum && stored != computed {
            return Err(FormatError::ChecksumMismatch { stored, computed }.into());
        }
        Ok(())
    }

    /// Move to the next token, decoding its payload.
    fn advance(&mut self) -> Result<()> {
        if let Some((kind, count)) = self.pending_block.take() {
            self.input.bytes(count.saturating_mul(kind.element_size() as u64))?;
        }

        self.token_start = self.input.position;
        if self.started && self.depth == 0 {
            if self.token != TreeToken::None {
                self.read_trailer()?;
                self.token = TreeToken::None;
                return Ok(());
            }
            return Err(FormatError::Truncated.into());
        }

        let marker = self.input.byte()?;
        self.started = true;
        self.token = match marker {
            START_OBJECT => {
                self.depth += 1;
                TreeToken::StartObject
            }
            END_OBJECT => {
                self.depth = self.depth.saturating_sub(1);
                TreeToken::EndObject
            }
            START_ARRAY => {
                self.depth += 1;
                TreeToken::StartArray
            }
            END_ARRAY => {
                self.depth = self.depth.saturating_sub(1);
                TreeToken::EndArray
            }
            PROPERTY_NAME => {
                self.text = self.read_text()?;
                TreeToken::PropertyName
            }
            STRING => {
                self.text = self.read_text()?;
                TreeToken::String
            }
            INTEGER => {
                self.integer = unzigzag(self.input.varint()?);
                TreeToken::Integer
            }
            FLOAT => {
                let mut raw = [0u8; 8];
                self.input.fill(&mut raw)?;
                self.float = f64::from_le_bytes(raw);
                TreeToken::Float
            }
            TRUE | FALSE => {
                self.boolean = marker == TRUE;
                TreeToken::Boolean
            }
            NULL => TreeToken::Null,
            BLOCK => {
                let kind = BlockKind::from_tag(self.input.byte()?)?;
                let count = self.input.varint()?;
                self.pending_block = Some((kind, count));
                TreeToken::BlockArray
            }
            other => {
                return Err(FormatError::InvalidMarker {
                    marker: other,
                    position: self.token_start,
                }
                .into());
            }
        };
        Ok(())
    }
}

impl<R: Read> TreeReader for BinaryTreeReader<R> {
    fn settings(&self) -> &TreeSerializationSettings {
        &self.settings
    }

    fn token(&self) -> TreeToken {
        self.token
    }

    fn token_position(&self) -> u64 {
        self.token_start
    }

    fn expect(&mut self, token: TreeToken) -> Result<()> {
        self.require(token)?;
        self.advance()
    }

    fn read_property_name(&mut self) -> Result<String> {
        self.require(TreeToken::PropertyName)?;
        let name = std::mem::take(&mut self.text);
        self.advance()?;
        Ok(name)
    }

    fn read_string(&mut self) -> Result<String> {
        self.require(TreeToken::String)?;
        let value = std::mem::take(&mut self.text);
        self.advance()?;
        Ok(value)
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.require(TreeToken::Integer)?;
        let value = self.integer;
        self.advance()?;
        Ok(value)
    }

    fn read_f64(&mut self) -> Result<f64> {
        let value = match self.token {
            TreeToken::Float => self.float,
            TreeToken::Integer => self.integer as f64,
            _ => return Err(self.mismatch(TreeToken::Float).into()),
        };
        self.advance()?;
        Ok(value)
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.require(TreeToken::Boolean)?;
        let value = self.boolean;
        self.advance()?;
        Ok(value)
    }

    fn read_block(&mut self, kind: BlockKind) -> Result<BlockVec> {
        self.require(TreeToken::BlockArray)?;
        let Some((found, count)) = self.pending_block.take() else {
            return Err(self.mismatch(TreeToken::BlockArray).into());
        };
        if found != kind {
            return Err(FormatError::BlockKindMismatch {
                expected: kind.name(),
                found: found.name(),
            }
            .into());
        }
        let bytes = self.input.bytes(count.saturating_mul(found.element_size() as u64))?;
        let block = BlockVec::decode_le(found, &bytes)?;
        self.advance()?;
        Ok(block)
    }

    fn skip(&mut self) -> Result<()> {
        let mut open = 0usize;
        loop {
            match self.token {
                TreeToken::StartObject | TreeToken::StartArray => open += 1,
                TreeToken::EndObject | TreeToken::EndArray => {
                    open = open
                        .checked_sub(1)
                        .ok_or_else(|| self.mismatch(TreeToken::StartObject))?;
                }
                TreeToken::None => return Err(FormatError::Truncated.into()),
                _ => {}
            }
            self.advance()?;
            if open == 0 {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample() -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = BinaryTreeWriter::new(&mut buf).unwrap();
        writer.start_object().unwrap();
        writer.property_name("Name").unwrap();
        writer.write_str("Scott").unwrap();
        writer.property_name("Age").unwrap();
        writer.write_i64(-39).unwrap();
        writer.property_name("Values").unwrap();
        writer.write_block(Block::U16(&[1, 2, 3])).unwrap();
        writer.property_name("Nested").unwrap();
        writer.start_array().unwrap();
        writer.write_f64(1.5).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_null().unwrap();
        writer.end_array().unwrap();
        writer.end_object().unwrap();
        writer.finish().unwrap();
        drop(writer);
        buf
    }

    #[test]
    fn test_varint_and_zigzag() {
        for value in [0i64, 1, -1, 63, -64, i64::MAX, i64::MIN] {
            assert_eq!(unzigzag(zigzag(value)), value);
        }
        let mut out = Vec::new();
        encode_varint(300, &mut out);
        assert_eq!(out, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_read_tokens_in_order() {
        let buf = sample();
        assert_eq!(&buf[0..4], MAGIC);

        let mut reader = BinaryTreeReader::new(buf.as_slice(), Default::default()).unwrap();
        reader.expect(TreeToken::StartObject).unwrap();
        assert_eq!(reader.read_property_name().unwrap(), "Name");
        assert_eq!(reader.read_string().unwrap(), "Scott");
        assert_eq!(reader.read_property_name().unwrap(), "Age");
        assert_eq!(reader.read_i64().unwrap(), -39);
        assert_eq!(reader.read_property_name().unwrap(), "Values");
        assert_eq!(
            reader.read_block(BlockKind::U16).unwrap(),
            BlockVec::U16(vec![1, 2, 3])
        );
        assert_eq!(reader.read_property_name().unwrap(), "Nested");
        reader.expect(TreeToken::StartArray).unwrap();
        assert_eq!(reader.read_f64().unwrap(), 1.5);
        assert!(reader.read_bool().unwrap());
        reader.expect(TreeToken::Null).unwrap();
        reader.expect(TreeToken::EndArray).unwrap();
        reader.expect(TreeToken::EndObject).unwrap();
        assert_eq!(reader.token(), TreeToken::None);
    }

    #[test]
    fn test_skip_nested_values() {
        let buf = sample();
        let mut reader = BinaryTreeReader::new(buf.as_slice(), Default::default()).unwrap();
        reader.expect(TreeToken::StartObject).unwrap();
        for _ in 0..4 {
            reader.read_property_name().unwrap();
            reader.skip().unwrap();
        }
        assert_eq!(reader.token(), TreeToken::EndObject);
    }

    #[test]
    fn test_mismatch_reports_byte_offset() {
        let buf = sample();
        let mut reader = BinaryTreeReader::new(buf.as_slice(), Default::default()).unwrap();
        reader.expect(TreeToken::StartObject).unwrap();
        let at = reader.token_position();
        let err = reader.read_string().unwrap_err();
        match err {
            Error::Format(FormatError::UnexpectedToken {
                expected,
                found,
                position,
            }) => {
                assert_eq!(expected, "string");
                assert_eq!(found, "property name");
                assert_eq!(position, at);
                assert!(position > MAGIC.len() as u64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = sample();
        buf[0] = b'X';
        let err = BinaryTreeReader::new(buf.as_slice(), Default::default()).err().unwrap();
        assert!(matches!(err, Error::Format(FormatError::InvalidMagic)));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut buf = sample();
        let at = buf.windows(5).position(|w| w == b"Scott").unwrap();
        buf[at] = b'T';

        let mut reader = BinaryTreeReader::new(buf.as_slice(), Default::default()).unwrap();
        let err = reader.skip().unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::ChecksumMismatch { .. })));

        let settings = TreeSerializationSettings {
            verify_checksum: false,
            ..Default::default()
        };
        let mut reader = BinaryTreeReader::new(buf.as_slice(), settings).unwrap();
        reader.skip().unwrap();
        assert_eq!(reader.token(), TreeToken::None);
    }

    #[test]
    fn test_truncated_stream() {
        let buf = sample();
        let cut = &buf[..buf.len() - 12];
        let mut reader = BinaryTreeReader::new(cut, Default::default()).unwrap();
        let err = reader.skip().unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::Truncated)));
    }

    #[test]
    fn test_unbalanced_writer() {
        let mut buf = Vec::new();
        let mut writer = BinaryTreeWriter::new(&mut buf).unwrap();
        writer.start_object().unwrap();
        assert!(matches!(
            writer.finish(),
            Err(Error::Format(FormatError::Unbalanced { open: 1 }))
        ));
    }
}
