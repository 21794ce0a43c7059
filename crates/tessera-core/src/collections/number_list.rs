use std::hash::{Hash, Hasher};

use crate::column::{Column, Number, VariableLengthColumn};
use crate::error::{AccessError, Result};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::value::Value;

/// A list of numbers per row, stored directly in a variable-length column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumberListColumn<T: Number> {
    values: VariableLengthColumn<T>,
}

impl<T: Number> NumberListColumn<T> {
    pub fn new() -> Self {
        Self {
            values: VariableLengthColumn::new(),
        }
    }

    pub fn list(&self, row: usize) -> NumberList<'_, T> {
        NumberList {
            slice: self.values.slice(row),
        }
    }

    pub fn list_mut(&mut self, row: usize) -> NumberListMut<'_, T> {
        NumberListMut { column: self, row }
    }

    pub(crate) fn slice(&self, row: usize) -> &[T] {
        self.values.slice(row)
    }
}

/// Read-only view of one row's numbers.
#[derive(Debug, Clone, Copy)]
pub struct NumberList<'a, T> {
    slice: &'a [T],
}

impl<'a, T: Number> NumberList<'a, T> {
    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.slice.get(index).copied()
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.slice
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + use<'a, T> {
        self.slice.iter().copied()
    }

    pub fn contains(&self, value: T) -> bool {
        self.slice.contains(&value)
    }

    pub fn index_of(&self, value: T) -> Option<usize> {
        self.slice.iter().position(|v| *v == value)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.slice.to_vec()
    }
}

impl<T: Number> PartialEq for NumberList<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.slice == other.slice
    }
}

impl<T: Number> PartialEq<[T]> for NumberList<'_, T> {
    fn eq(&self, other: &[T]) -> bool {
        self.slice == other
    }
}

impl<T: Number + Eq> Eq for NumberList<'_, T> {}

impl<T: Number + Hash> Hash for NumberList<'_, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slice.hash(state);
    }
}

/// Mutable view of one row's numbers.
///
/// Every mutation rewrites the row, which lands in its chapter's overflow
/// area until the next trim.
pub struct NumberListMut<'a, T: Number> {
    column: &'a mut NumberListColumn<T>,
    row: usize,
}

fn out_of_range(index: usize, len: usize) -> crate::error::Error {
    AccessError::IndexOutOfRange {
        index: index as i64,
        len,
    }
    .into()
}

impl<T: Number> NumberListMut<'_, T> {
    fn update<R>(&mut self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let mut values = self.column.values.get(self.row);
        let result = f(&mut values);
        self.column.values.set(self.row, values);
        result
    }

    pub fn as_list(&self) -> NumberList<'_, T> {
        self.column.list(self.row)
    }

    pub fn len(&self) -> usize {
        self.as_list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.as_list().get(index)
    }

    pub fn contains(&self, value: T) -> bool {
        self.as_list().contains(value)
    }

    pub fn index_of(&self, value: T) -> Option<usize> {
        self.as_list().index_of(value)
    }

    pub fn push(&mut self, value: T) {
        self.update(|values| values.push(value));
    }

    pub fn insert(&mut self, index: usize, value: T) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(out_of_range(index, len));
        }
        self.update(|values| values.insert(index, value));
        Ok(())
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(out_of_range(index, len));
        }
        self.update(|values| values[index] = value);
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<T> {
        let len = self.len();
        if index >= len {
            return Err(out_of_range(index, len));
        }
        Ok(self.update(|values| values.remove(index)))
    }

    /// Remove the first occurrence of `value`.
    pub fn remove(&mut self, value: T) -> bool {
        match self.index_of(value) {
            Some(index) => {
                self.update(|values| values.remove(index));
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        if !self.is_empty() {
            self.column.values.set(self.row, Vec::new());
        }
    }

    pub fn set_to(&mut self, values: impl IntoIterator<Item = T>) {
        self.column.values.set(self.row, values.into_iter().collect());
    }
}

impl<T: Number> Column for NumberListColumn<T> {
    type Item = Vec<T>;

    fn len(&self) -> usize {
        self.values.len()
    }

    fn get(&self, index: usize) -> Vec<T> {
        self.values.get(index)
    }

    fn set(&mut self, index: usize, value: Vec<T>) {
        self.values.set(index, value);
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn remove_from_end(&mut self, count: usize) {
        self.values.remove_from_end(count);
    }

    fn trim(&mut self) {
        self.values.trim();
    }

    fn default_item(&self) -> Vec<T> {
        Vec::new()
    }

    fn item_to_value(&self, item: Vec<T>) -> Value {
        self.values.item_to_value(item)
    }

    fn item_from_value(&self, value: Value) -> Result<Vec<T>> {
        self.values.item_from_value(value)
    }
}

impl<T: Number> TreeSerializable for NumberListColumn<T> {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        self.values.write_tree(writer)
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.values.read_tree(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_list_mutation() {
        let mut column = NumberListColumn::<i32>::new();
        let mut list = column.list_mut(2);
        list.push(5);
        list.push(7);
        list.insert(0, 1).unwrap();
        assert_eq!(list.as_list().as_slice(), &[1, 5, 7]);

        list.set(1, 6).unwrap();
        assert_eq!(list.remove_at(2).unwrap(), 7);
        assert!(list.remove(1));
        assert!(!list.remove(1));
        assert_eq!(list.as_list().to_vec(), vec![6]);
        assert!(list.insert(5, 0).is_err());
        assert!(list.set(1, 0).is_err());
        assert!(list.remove_at(1).is_err());

        assert_eq!(column.len(), 3);
        assert!(column.list(0).is_empty());
    }

    #[test]
    fn test_views_compare_and_hash_by_content() {
        let mut column = NumberListColumn::<u32>::new();
        column.list_mut(0).set_to([1, 2, 3]);
        column.list_mut(1).set_to([1, 2, 3]);
        column.list_mut(2).set_to([3, 2, 1]);

        assert_eq!(column.list(0), column.list(1));
        assert_ne!(column.list(0), column.list(2));
        assert!(column.list(0) == *[1u32, 2, 3].as_slice());

        let set: HashSet<_> = (0..3).map(|row| column.list(row)).collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_clear_and_trim() {
        let mut column = NumberListColumn::<i64>::new();
        for row in 0..40 {
            column.list_mut(row).set_to(0..row as i64);
        }
        column.list_mut(10).clear();
        column.trim();
        assert!(column.list(10).is_empty());
        assert_eq!(column.list(39).len(), 39);
        assert_eq!(column.list(39).index_of(38), Some(38));
    }
}
