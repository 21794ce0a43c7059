//! Per-row lists of any column type.
//!
//! Each row stores a list of positions into one shared values column.
//! Adding an element appends a new slot to the values column; removing one
//! drops only the position, leaving a hole that `trim` reclaims.

use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::column::Column;
use crate::error::{AccessError, FormatError, Result};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::value::Value;

use super::number_list::{NumberList, NumberListColumn};

const INDICES: &str = "Indices";
const VALUES: &str = "Values";

#[derive(Debug, Clone, PartialEq)]
pub struct ListColumn<C: Column> {
    values: C,
    indices: NumberListColumn<i32>,
}

impl<C: Column> ListColumn<C> {
    /// Build a list column over `values`, which is cleared.
    pub fn new(mut values: C) -> Self {
        values.clear();
        Self {
            values,
            indices: NumberListColumn::new(),
        }
    }

    pub fn list(&self, row: usize) -> ColumnList<'_, C> {
        ColumnList {
            values: &self.values,
            positions: self.indices.list(row),
        }
    }

    pub fn list_mut(&mut self, row: usize) -> ColumnListMut<'_, C> {
        ColumnListMut { column: self, row }
    }

    /// The shared values column, holes included.
    pub fn values(&self) -> &C {
        &self.values
    }

    fn is_compact(&self) -> bool {
        let mut next = 0usize;
        for row in 0..self.indices.len() {
            for position in self.indices.slice(row) {
                if *position as usize != next {
                    return false;
                }
                next += 1;
            }
        }
        next == self.values.len()
    }
}

/// Read-only view of one row's list.
pub struct ColumnList<'a, C: Column> {
    values: &'a C,
    positions: NumberList<'a, i32>,
}

impl<'a, C: Column> ColumnList<'a, C> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<C::Item> {
        self.positions
            .get(index)
            .map(|position| self.values.get(position as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = C::Item> + use<'a, C> {
        let values = self.values;
        self.positions
            .iter()
            .map(move |position| values.get(position as usize))
    }

    pub fn to_vec(&self) -> Vec<C::Item> {
        self.iter().collect()
    }

    pub fn contains(&self, item: &C::Item) -> bool
    where
        C::Item: PartialEq,
    {
        self.iter().any(|v| v == *item)
    }
}

impl<C: Column> PartialEq for ColumnList<'_, C>
where
    C::Item: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<C: Column> Eq for ColumnList<'_, C> where C::Item: Eq {}

impl<C: Column> Hash for ColumnList<'_, C>
where
    C::Item: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for item in self.iter() {
            item.hash(state);
        }
    }
}

/// Mutable view of one row's list.
pub struct ColumnListMut<'a, C: Column> {
    column: &'a mut ListColumn<C>,
    row: usize,
}

impl<C: Column> ColumnListMut<'_, C> {
    pub fn as_list(&self) -> ColumnList<'_, C> {
        self.column.list(self.row)
    }

    pub fn len(&self) -> usize {
        self.column.indices.list(self.row).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<C::Item> {
        self.as_list().get(index)
    }

    fn append_slot(&mut self, item: C::Item) -> i32 {
        let slot = self.column.values.len();
        self.column.values.set(slot, item);
        slot as i32
    }

    pub fn push(&mut self, item: C::Item) {
        let slot = self.append_slot(item);
        self.column.indices.list_mut(self.row).push(slot);
    }

    pub fn insert(&mut self, index: usize, item: C::Item) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(AccessError::IndexOutOfRange {
                index: index as i64,
                len,
            }
            .into());
        }
        let slot = self.append_slot(item);
        self.column.indices.list_mut(self.row).insert(index, slot)
    }

    /// Overwrite element `index` in place.
    pub fn set(&mut self, index: usize, item: C::Item) -> Result<()> {
        let len = self.len();
        let Some(position) = self.column.indices.list(self.row).get(index) else {
            return Err(AccessError::IndexOutOfRange {
                index: index as i64,
                len,
            }
            .into());
        };
        self.column.values.set(position as usize, item);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<C::Item> {
        let position = self.column.indices.list_mut(self.row).remove_at(index)?;
        Ok(self.column.values.get(position as usize))
    }

    pub fn clear(&mut self) {
        self.column.indices.list_mut(self.row).clear();
    }

    /// Replace the row's contents, reusing its existing slots first.
    pub fn set_to(&mut self, items: impl IntoIterator<Item = C::Item>) {
        let existing = self.column.indices.list(self.row).to_vec();
        let mut positions = Vec::with_capacity(existing.len());
        for (i, item) in items.into_iter().enumerate() {
            match existing.get(i) {
                Some(&slot) => {
                    self.column.values.set(slot as usize, item);
                    positions.push(slot);
                }
                None => positions.push(self.append_slot(item)),
            }
        }
        self.column.indices.list_mut(self.row).set_to(positions);
    }
}

impl<C: Column> Column for ListColumn<C> {
    type Item = Vec<C::Item>;

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, index: usize) -> Vec<C::Item> {
        self.list(index).to_vec()
    }

    fn set(&mut self, index: usize, value: Vec<C::Item>) {
        self.list_mut(index).set_to(value);
    }

    fn clear(&mut self) {
        self.values.clear();
        self.indices.clear();
    }

    fn remove_from_end(&mut self, count: usize) {
        self.indices.remove_from_end(count);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.indices.swap(a, b);
    }

    /// Rewrite the values column in row order, dropping every hole.
    fn trim(&mut self) {
        if !self.is_compact() {
            let rows: Vec<Vec<C::Item>> = (0..self.indices.len()).map(|row| self.get(row)).collect();
            let before = self.values.len();
            self.values.clear();
            let mut next = 0i32;
            for (row, items) in rows.into_iter().enumerate() {
                let mut positions = Vec::with_capacity(items.len());
                for item in items {
                    self.values.set(next as usize, item);
                    positions.push(next);
                    next += 1;
                }
                self.indices.set(row, positions);
            }
            debug!(before, after = next, "compacted list values");
        }
        self.values.trim();
        self.indices.trim();
    }

    fn grow_to(&mut self, len: usize) {
        self.indices.grow_to(len);
    }

    fn default_item(&self) -> Vec<C::Item> {
        Vec::new()
    }

    fn item_to_value(&self, item: Vec<C::Item>) -> Value {
        Value::List(
            item.into_iter()
                .map(|v| self.values.item_to_value(v))
                .collect(),
        )
    }

    fn item_from_value(&self, value: Value) -> Result<Vec<C::Item>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => items
                .into_iter()
                .map(|v| self.values.item_from_value(v))
                .collect(),
            other => Err(other.mismatch("list").into()),
        }
    }
}

impl<C: Column> TreeSerializable for ListColumn<C> {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        writer.start_object()?;
        writer.write_property(INDICES, &self.indices)?;
        writer.write_property(VALUES, &self.values)?;
        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.clear();
        reader.read_object(|r, name| match name {
            INDICES => {
                self.indices.read_tree(r)?;
                Ok(true)
            }
            VALUES => {
                self.values.read_tree(r)?;
                Ok(true)
            }
            _ => Ok(false),
        })?;

        let slots = self.values.len();
        for row in 0..self.indices.len() {
            if let Some(bad) = self
                .indices
                .slice(row)
                .iter()
                .find(|p| **p < 0 || **p as usize >= slots)
            {
                return Err(FormatError::Corrupt(format!(
                    "list row {row} refers to value {bad} of {slots}"
                ))
                .into());
            }
        }
        Ok(())
    }
}
