//! Fixed-width numeric columns.

use crate::error::Result;
use crate::io::{BlockElement, TreeReader, TreeSerializable, TreeWriter};
use crate::value::{ScalarValue, Value};

use super::Column;

/// A fixed-width element type usable in number columns and number lists.
pub trait Number: BlockElement + ScalarValue {}

impl<T: BlockElement + ScalarValue> Number for T {}

const VALUES: &str = "Values";

/// A dense column of numbers (or chars).
#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn<T: Number> {
    values: Vec<T>,
    default: T,
}

impl<T: Number> NumberColumn<T> {
    pub fn new(default: T) -> Self {
        Self {
            values: Vec::new(),
            default,
        }
    }

    pub fn from_vec(values: Vec<T>, default: T) -> Self {
        Self { values, default }
    }

    pub fn default_value(&self) -> T {
        self.default
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }
}

impl<T: Number> Default for NumberColumn<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Number> Column for NumberColumn<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.values.len()
    }

    fn get(&self, index: usize) -> T {
        self.values.get(index).copied().unwrap_or(self.default)
    }

    fn set(&mut self, index: usize, value: T) {
        if index >= self.values.len() {
            self.values.resize(index + 1, self.default);
        }
        self.values[index] = value;
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn remove_from_end(&mut self, count: usize) {
        let len = self.values.len().saturating_sub(count);
        self.values.truncate(len);
    }

    fn swap(&mut self, a: usize, b: usize) {
        let len = a.max(b) + 1;
        if len > self.values.len() {
            self.values.resize(len, self.default);
        }
        self.values.swap(a, b);
    }

    fn trim(&mut self) {
        self.values.shrink_to_fit();
    }

    fn default_item(&self) -> T {
        self.default
    }

    fn item_to_value(&self, item: T) -> Value {
        item.into_value()
    }

    fn item_from_value(&self, value: Value) -> Result<T> {
        match value {
            Value::Null => Ok(self.default),
            other => T::try_from_value(other),
        }
    }
}

impl<T: Number> TreeSerializable for NumberColumn<T> {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        writer.start_object()?;
        writer.write_block_property(VALUES, &self.values)?;
        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.values.clear();
        reader.read_object(|r, name| match name {
            VALUES => {
                self.values = r.read_block_of()?;
                Ok(true)
            }
            _ => Ok(false),
        })
    }
}
