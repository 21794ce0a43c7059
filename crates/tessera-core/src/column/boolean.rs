use crate::error::{FormatError, Result};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::value::{ScalarValue, Value};

use super::Column;

const COUNT: &str = "Count";
const BITS: &str = "Bits";
const DEFAULT: &str = "Default";

/// A bit-packed column of booleans.
///
/// Bits are stored XOR the default, so unwritten and default rows are both
/// zero bits. The default is written alongside the bits, and a reader
/// configured with a different default flips them on read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BooleanColumn {
    bits: Vec<u32>,
    count: usize,
    default: bool,
}

fn words_for(count: usize) -> usize {
    count.div_ceil(32)
}

impl BooleanColumn {
    pub fn new(default: bool) -> Self {
        Self {
            bits: Vec::new(),
            count: 0,
            default,
        }
    }

    /// Flip every stored bit below `count`.
    fn invert(&mut self) {
        for word in &mut self.bits {
            *word = !*word;
        }
        if self.count % 32 != 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= (1u32 << (self.count % 32)) - 1;
            }
        }
    }

    fn bit(&self, index: usize) -> bool {
        self.bits
            .get(index / 32)
            .is_some_and(|word| word & (1 << (index % 32)) != 0)
    }
}

impl Column for BooleanColumn {
    type Item = bool;

    fn len(&self) -> usize {
        self.count
    }

    fn get(&self, index: usize) -> bool {
        if index >= self.count {
            return self.default;
        }
        self.bit(index) ^ self.default
    }

    fn set(&mut self, index: usize, value: bool) {
        if index >= self.count {
            self.count = index + 1;
            self.bits.resize(words_for(self.count), 0);
        }
        let mask = 1u32 << (index % 32);
        if value ^ self.default {
            self.bits[index / 32] |= mask;
        } else {
            self.bits[index / 32] &= !mask;
        }
    }

    fn clear(&mut self) {
        self.bits.clear();
        self.count = 0;
    }

    fn remove_from_end(&mut self, count: usize) {
        let len = self.count.saturating_sub(count);
        self.bits.truncate(words_for(len));
        if len % 32 != 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= (1u32 << (len % 32)) - 1;
            }
        }
        self.count = len;
    }

    fn trim(&mut self) {
        self.bits.shrink_to_fit();
    }

    fn default_item(&self) -> bool {
        self.default
    }

    fn item_to_value(&self, item: bool) -> Value {
        Value::Bool(item)
    }

    fn item_from_value(&self, value: Value) -> Result<bool> {
        match value {
            Value::Null => Ok(self.default),
            other => bool::try_from_value(other),
        }
    }
}

impl TreeSerializable for BooleanColumn {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        writer.start_object()?;
        writer.write_i64_property(COUNT, self.count as i64)?;
        writer.property_name(DEFAULT)?;
        writer.write_bool(self.default)?;
        writer.write_block_property(BITS, &self.bits)?;
        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.clear();
        let mut written_default = self.default;
        reader.read_object(|r, name| match name {
            COUNT => {
                self.count = r.read_usize()?;
                Ok(true)
            }
            DEFAULT => {
                written_default = r.read_bool()?;
                Ok(true)
            }
            BITS => {
                self.bits = r.read_block_of()?;
                Ok(true)
            }
            _ => Ok(false),
        })?;

        if self.bits.len() < words_for(self.count) {
            return Err(FormatError::Corrupt(format!(
                "boolean column has {} rows but only {} bit words",
                self.count,
                self.bits.len()
            ))
            .into());
        }
        self.bits.truncate(words_for(self.count));
        if written_default != self.default {
            self.invert();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{TreeFormat, from_bytes, to_bytes};

    #[test]
    fn test_default_true() {
        let mut column = BooleanColumn::new(true);
        assert!(column.get(10));
        column.set(40, false);
        assert_eq!(column.len(), 41);
        assert!(column.get(39));
        assert!(!column.get(40));
        assert_eq!(column.bits.len(), 2);
    }

    #[test]
    fn test_remove_from_end_clears_stale_bits() {
        let mut column = BooleanColumn::new(false);
        column.set(5, true);
        column.remove_from_end(3);
        assert_eq!(column.len(), 3);
        column.set(9, false);
        assert!(!column.get(5));
    }

    #[test]
    fn test_round_trip() {
        let mut column = BooleanColumn::new(false);
        for i in (0..100).step_by(3) {
            column.set(i, true);
        }
        let bytes = to_bytes(&column, TreeFormat::Binary).unwrap();
        let mut read = BooleanColumn::new(false);
        from_bytes(&mut read, TreeFormat::Binary, &bytes, &Default::default()).unwrap();
        assert_eq!(read, column);
    }

    #[test]
    fn test_reader_with_other_default_keeps_values() {
        let mut column = BooleanColumn::new(false);
        column.set(0, true);
        column.set(1, false);
        column.set(34, true);

        for format in [TreeFormat::Binary, TreeFormat::Json] {
            let bytes = to_bytes(&column, format).unwrap();
            let mut read = BooleanColumn::new(true);
            from_bytes(&mut read, format, &bytes, &Default::default()).unwrap();
            assert_eq!(read.len(), 35);
            let values: Vec<bool> = (0..35).map(|i| read.get(i)).collect();
            let expected: Vec<bool> = (0..35).map(|i| column.get(i)).collect();
            assert_eq!(values, expected);
            assert!(read.get(35));
        }
    }

    #[test]
    fn test_missing_bits_is_corrupt() {
        let doc = br#"{"Count": 40, "Bits": [1]}"#;
        let mut read = BooleanColumn::new(false);
        assert!(from_bytes(&mut read, TreeFormat::Json, doc, &Default::default()).is_err());
    }
}
