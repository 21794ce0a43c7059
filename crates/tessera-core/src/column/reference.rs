//! Columns of references to rows of another table.
//!
//! References are stored as `i32` row indices into the named target table,
//! with [`NULL_INDEX`] meaning "no row". Handles are produced and consumed
//! through the target table's [`RowResolver`].

use crate::collections::{NumberListColumn, TypedList, TypedListMut};
use crate::error::{AccessError, Result};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::types::{NULL_INDEX, RowHandle, RowResolver};
use crate::value::{ScalarValue, Value};

use super::Column;
use super::number::NumberColumn;

fn reference_to_value(stored: i32) -> Value {
    if stored == NULL_INDEX {
        Value::Null
    } else {
        Value::I32(stored)
    }
}

fn reference_from_value(value: Value) -> Result<i32> {
    let stored = match value {
        Value::Null => NULL_INDEX,
        other => i32::try_from_value(other)?,
    };
    if stored < NULL_INDEX {
        return Err(AccessError::IndexOutOfRange {
            index: i64::from(stored),
            len: 0,
        }
        .into());
    }
    Ok(stored)
}

/// One optional reference per row.
#[derive(Debug, Clone, PartialEq)]
pub struct RefColumn {
    target: String,
    indices: NumberColumn<i32>,
}

impl RefColumn {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            indices: NumberColumn::new(NULL_INDEX),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn get_row(&self, index: usize, resolver: &RowResolver) -> Result<Option<RowHandle>> {
        resolver.get(self.indices.get(index))
    }

    pub fn set_row(
        &mut self,
        index: usize,
        row: Option<RowHandle>,
        resolver: &RowResolver,
    ) -> Result<()> {
        let stored = resolver.local_index(row)?;
        self.indices.set(index, stored);
        Ok(())
    }
}

impl Column for RefColumn {
    type Item = i32;

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, index: usize) -> i32 {
        self.indices.get(index)
    }

    fn set(&mut self, index: usize, value: i32) {
        self.indices.set(index, value);
    }

    fn clear(&mut self) {
        self.indices.clear();
    }

    fn remove_from_end(&mut self, count: usize) {
        self.indices.remove_from_end(count);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.indices.swap(a, b);
    }

    fn trim(&mut self) {
        self.indices.trim();
    }

    fn default_item(&self) -> i32 {
        NULL_INDEX
    }

    fn item_to_value(&self, item: i32) -> Value {
        reference_to_value(item)
    }

    fn item_from_value(&self, value: Value) -> Result<i32> {
        reference_from_value(value)
    }

    fn reference_target(&self) -> Option<&str> {
        Some(&self.target)
    }

    fn references(&self) -> Vec<(usize, i32)> {
        self.indices
            .as_slice()
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != NULL_INDEX)
            .map(|(row, v)| (row, *v))
            .collect()
    }
}

impl TreeSerializable for RefColumn {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        self.indices.write_tree(writer)
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.indices.read_tree(reader)
    }
}

/// A list of references per row.
#[derive(Debug, Clone, PartialEq)]
pub struct RefListColumn {
    target: String,
    lists: NumberListColumn<i32>,
}

impl RefListColumn {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            lists: NumberListColumn::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn typed_list(&self, row: usize, resolver: RowResolver) -> TypedList<'_> {
        TypedList::new(self.lists.list(row), resolver)
    }

    pub fn typed_list_mut(&mut self, row: usize, resolver: RowResolver) -> TypedListMut<'_> {
        TypedListMut::new(self.lists.list_mut(row), resolver)
    }
}

impl Column for RefListColumn {
    type Item = Vec<i32>;

    fn len(&self) -> usize {
        self.lists.len()
    }

    fn get(&self, index: usize) -> Vec<i32> {
        self.lists.get(index)
    }

    fn set(&mut self, index: usize, value: Vec<i32>) {
        self.lists.set(index, value);
    }

    fn clear(&mut self) {
        self.lists.clear();
    }

    fn remove_from_end(&mut self, count: usize) {
        self.lists.remove_from_end(count);
    }

    fn trim(&mut self) {
        self.lists.trim();
    }

    fn default_item(&self) -> Vec<i32> {
        Vec::new()
    }

    fn item_to_value(&self, item: Vec<i32>) -> Value {
        Value::List(item.into_iter().map(reference_to_value).collect())
    }

    fn item_from_value(&self, value: Value) -> Result<Vec<i32>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => items.into_iter().map(reference_from_value).collect(),
            other => Err(other.mismatch("list").into()),
        }
    }

    fn reference_target(&self) -> Option<&str> {
        Some(&self.target)
    }

    fn references(&self) -> Vec<(usize, i32)> {
        (0..self.lists.len())
            .flat_map(|row| {
                self.lists
                    .slice(row)
                    .iter()
                    .filter(|v| **v != NULL_INDEX)
                    .map(move |v| (row, *v))
            })
            .collect()
    }
}

impl TreeSerializable for RefListColumn {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        self.lists.write_tree(writer)
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.lists.read_tree(reader)
    }
}
