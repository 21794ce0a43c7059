use crate::error::{FormatError, Result};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::value::{ScalarValue, Value};

use super::Column;
use super::variable::VariableLengthColumn;

/// UTF-8 strings over a chaptered byte column. The default is `""`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringColumn {
    bytes: VariableLengthColumn<u8>,
}

impl StringColumn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow row `index` without allocating.
    pub fn get_str(&self, index: usize) -> &str {
        std::str::from_utf8(self.bytes.slice(index)).unwrap_or_default()
    }

    pub fn set_str(&mut self, index: usize, value: &str) {
        self.bytes.set(index, value.as_bytes().to_vec());
    }
}

impl Column for StringColumn {
    type Item = String;

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn get(&self, index: usize) -> String {
        self.get_str(index).to_owned()
    }

    fn set(&mut self, index: usize, value: String) {
        self.bytes.set(index, value.into_bytes());
    }

    fn clear(&mut self) {
        self.bytes.clear();
    }

    fn remove_from_end(&mut self, count: usize) {
        self.bytes.remove_from_end(count);
    }

    fn trim(&mut self) {
        self.bytes.trim();
    }

    fn default_item(&self) -> String {
        String::new()
    }

    fn item_to_value(&self, item: String) -> Value {
        Value::String(item)
    }

    fn item_from_value(&self, value: Value) -> Result<String> {
        String::try_from_value(value)
    }
}

impl TreeSerializable for StringColumn {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        self.bytes.write_tree(writer)
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.bytes.read_tree(reader)?;
        for i in 0..self.bytes.len() {
            if std::str::from_utf8(self.bytes.slice(i)).is_err() {
                self.bytes.clear();
                return Err(FormatError::InvalidUtf8.into());
            }
        }
        Ok(())
    }
}
