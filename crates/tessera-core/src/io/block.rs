//! Block arrays: packed runs of fixed-width elements.
//!
//! Column storage is written as blocks rather than as one token per
//! element. On the wire a block is an element-kind tag, an element count and
//! the elements in little-endian order.

use crate::error::FormatError;

/// Element type of a block array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockKind {
    U8 = 1,
    I8 = 2,
    U16 = 3,
    I16 = 4,
    U32 = 5,
    I32 = 6,
    U64 = 7,
    I64 = 8,
    F32 = 9,
    F64 = 10,
    /// Unicode scalar values stored as `u32`.
    Char = 11,
}

impl BlockKind {
    pub fn from_tag(tag: u8) -> Result<Self, FormatError> {
        Ok(match tag {
            1 => BlockKind::U8,
            2 => BlockKind::I8,
            3 => BlockKind::U16,
            4 => BlockKind::I16,
            5 => BlockKind::U32,
            6 => BlockKind::I32,
            7 => BlockKind::U64,
            8 => BlockKind::I64,
            9 => BlockKind::F32,
            10 => BlockKind::F64,
            11 => BlockKind::Char,
            other => return Err(FormatError::InvalidBlockKind(other)),
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            BlockKind::U8 | BlockKind::I8 => 1,
            BlockKind::U16 | BlockKind::I16 => 2,
            BlockKind::U32 | BlockKind::I32 | BlockKind::F32 | BlockKind::Char => 4,
            BlockKind::U64 | BlockKind::I64 | BlockKind::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlockKind::U8 => "u8",
            BlockKind::I8 => "i8",
            BlockKind::U16 => "u16",
            BlockKind::I16 => "i16",
            BlockKind::U32 => "u32",
            BlockKind::I32 => "i32",
            BlockKind::U64 => "u64",
            BlockKind::I64 => "i64",
            BlockKind::F32 => "f32",
            BlockKind::F64 => "f64",
            BlockKind::Char => "char",
        }
    }
}

/// A borrowed block, as handed to a writer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Block<'a> {
    U8(&'a [u8]),
    I8(&'a [i8]),
    U16(&'a [u16]),
    I16(&'a [i16]),
    U32(&'a [u32]),
    I32(&'a [i32]),
    U64(&'a [u64]),
    I64(&'a [i64]),
    F32(&'a [f32]),
    F64(&'a [f64]),
    Char(&'a [char]),
}

/// An owned block, as produced by a reader.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockVec {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Char(Vec<char>),
}

macro_rules! for_each_block {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Self::U8($inner) => $body,
            Self::I8($inner) => $body,
            Self::U16($inner) => $body,
            Self::I16($inner) => $body,
            Self::U32($inner) => $body,
            Self::I32($inner) => $body,
            Self::U64($inner) => $body,
            Self::I64($inner) => $body,
            Self::F32($inner) => $body,
            Self::F64($inner) => $body,
            Self::Char($inner) => $body,
        }
    };
}

impl Block<'_> {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::U8(_) => BlockKind::U8,
            Block::I8(_) => BlockKind::I8,
            Block::U16(_) => BlockKind::U16,
            Block::I16(_) => BlockKind::I16,
            Block::U32(_) => BlockKind::U32,
            Block::I32(_) => BlockKind::I32,
            Block::U64(_) => BlockKind::U64,
            Block::I64(_) => BlockKind::I64,
            Block::F32(_) => BlockKind::F32,
            Block::F64(_) => BlockKind::F64,
            Block::Char(_) => BlockKind::Char,
        }
    }

    pub fn len(&self) -> usize {
        for_each_block!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the elements to `out` in little-endian order.
    pub fn encode_le(&self, out: &mut Vec<u8>) {
        out.reserve(self.len() * self.kind().element_size());
        match self {
            Block::U8(values) => out.extend_from_slice(values),
            Block::I8(values) => out.extend(values.iter().map(|v| *v as u8)),
            Block::Char(values) => {
                for v in values.iter() {
                    out.extend_from_slice(&u32::from(*v).to_le_bytes());
                }
            }
            Block::U16(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
            Block::I16(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
            Block::U32(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
            Block::I32(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
            Block::U64(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
            Block::I64(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
            Block::F32(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
            Block::F64(values) => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        }
    }
}

fn decode_chunks<const N: usize, T>(bytes: &[u8], convert: impl Fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            convert(raw)
        })
        .collect()
}

impl BlockVec {
    pub fn kind(&self) -> BlockKind {
        self.as_block().kind()
    }

    pub fn len(&self) -> usize {
        for_each_block!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_block(&self) -> Block<'_> {
        match self {
            BlockVec::U8(v) => Block::U8(v),
            BlockVec::I8(v) => Block::I8(v),
            BlockVec::U16(v) => Block::U16(v),
            BlockVec::I16(v) => Block::I16(v),
            BlockVec::U32(v) => Block::U32(v),
            BlockVec::I32(v) => Block::I32(v),
            BlockVec::U64(v) => Block::U64(v),
            BlockVec::I64(v) => Block::I64(v),
            BlockVec::F32(v) => Block::F32(v),
            BlockVec::F64(v) => Block::F64(v),
            BlockVec::Char(v) => Block::Char(v),
        }
    }

    /// Decode `bytes` (exactly `count * element_size` long) as elements of `kind`.
    pub fn decode_le(kind: BlockKind, bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() % kind.element_size() != 0 {
            return Err(FormatError::Truncated);
        }
        Ok(match kind {
            BlockKind::U8 => BlockVec::U8(bytes.to_vec()),
            BlockKind::I8 => BlockVec::I8(bytes.iter().map(|b| *b as i8).collect()),
            BlockKind::U16 => BlockVec::U16(decode_chunks(bytes, u16::from_le_bytes)),
            BlockKind::I16 => BlockVec::I16(decode_chunks(bytes, i16::from_le_bytes)),
            BlockKind::U32 => BlockVec::U32(decode_chunks(bytes, u32::from_le_bytes)),
            BlockKind::I32 => BlockVec::I32(decode_chunks(bytes, i32::from_le_bytes)),
            BlockKind::U64 => BlockVec::U64(decode_chunks(bytes, u64::from_le_bytes)),
            BlockKind::I64 => BlockVec::I64(decode_chunks(bytes, i64::from_le_bytes)),
            BlockKind::F32 => BlockVec::F32(decode_chunks(bytes, f32::from_le_bytes)),
            BlockKind::F64 => BlockVec::F64(decode_chunks(bytes, f64::from_le_bytes)),
            BlockKind::Char => {
                let points = decode_chunks(bytes, u32::from_le_bytes);
                let chars = points
                    .into_iter()
                    .map(|p| char::from_u32(p).ok_or(FormatError::InvalidChar(p)))
                    .collect::<Result<Vec<_>, _>>()?;
                BlockVec::Char(chars)
            }
        })
    }
}

/// A fixed-width type that can be stored in a block array.
pub trait BlockElement: Copy + Default + PartialEq + std::fmt::Debug + 'static {
    const KIND: BlockKind;

    fn as_block(values: &[Self]) -> Block<'_>;

    fn from_block(block: BlockVec) -> Result<Vec<Self>, FormatError>;
}

macro_rules! impl_block_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl BlockElement for $ty {
                const KIND: BlockKind = BlockKind::$variant;

                fn as_block(values: &[Self]) -> Block<'_> {
                    Block::$variant(values)
                }

                fn from_block(block: BlockVec) -> Result<Vec<Self>, FormatError> {
                    match block {
                        BlockVec::$variant(values) => Ok(values),
                        other => Err(FormatError::BlockKindMismatch {
                            expected: Self::KIND.name(),
                            found: other.kind().name(),
                        }),
                    }
                }
            }
        )*
    };
}

impl_block_element!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    char => Char,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_le() {
        let values = [1i32, -2, i32::MAX];
        let mut bytes = Vec::new();
        Block::I32(&values).encode_le(&mut bytes);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[4..8], &(-2i32).to_le_bytes());

        let decoded = BlockVec::decode_le(BlockKind::I32, &bytes).unwrap();
        assert_eq!(i32::from_block(decoded).unwrap(), values.to_vec());
    }

    #[test]
    fn test_invalid_char_rejected() {
        let bytes = 0xD800u32.to_le_bytes();
        assert!(matches!(
            BlockVec::decode_le(BlockKind::Char, &bytes),
            Err(FormatError::InvalidChar(0xD800))
        ));
    }

    #[test]
    fn test_kind_mismatch() {
        let err = u16::from_block(BlockVec::U8(vec![1, 2])).unwrap_err();
        assert!(matches!(
            err,
            FormatError::BlockKindMismatch {
                expected: "u16",
                found: "u8"
            }
        ));
    }

    #[test]
    fn test_ragged_length_is_truncated() {
        assert!(matches!(
            BlockVec::decode_le(BlockKind::U32, &[0, 1, 2]),
            Err(FormatError::Truncated)
        ));
    }

    #[test]
    fn test_tags_round_trip() {
        for tag in 1..=11u8 {
            assert_eq!(BlockKind::from_tag(tag).unwrap().tag(), tag);
        }
        assert!(BlockKind::from_tag(0).is_err());
    }
}
