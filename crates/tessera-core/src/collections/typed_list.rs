use crate::error::Result;
use crate::types::{RowHandle, RowResolver};

use super::number_list::{NumberList, NumberListMut};

/// A list of stored references seen as row handles of the target table.
pub struct TypedList<'a> {
    list: NumberList<'a, i32>,
    resolver: RowResolver,
}

impl<'a> TypedList<'a> {
    pub fn new(list: NumberList<'a, i32>, resolver: RowResolver) -> Self {
        Self { list, resolver }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Option<Option<RowHandle>>> {
        self.list
            .get(index)
            .map(|stored| self.resolver.get(stored))
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Option<RowHandle>>> + use<'a> {
        let resolver = self.resolver;
        self.list.iter().map(move |stored| resolver.get(stored))
    }

    pub fn to_vec(&self) -> Result<Vec<Option<RowHandle>>> {
        self.iter().collect()
    }

    /// Stored indices, `-1` for null entries.
    pub fn indices(&self) -> &'a [i32] {
        self.list.as_slice()
    }

    pub fn contains(&self, row: Option<RowHandle>) -> Result<bool> {
        let stored = self.resolver.local_index(row)?;
        Ok(self.list.contains(stored))
    }
}

/// Mutable counterpart of [`TypedList`]. Handles from another table or an
/// older generation are rejected.
pub struct TypedListMut<'a> {
    list: NumberListMut<'a, i32>,
    resolver: RowResolver,
}

impl<'a> TypedListMut<'a> {
    pub fn new(list: NumberListMut<'a, i32>, resolver: RowResolver) -> Self {
        Self { list, resolver }
    }

    pub fn as_list(&self) -> TypedList<'_> {
        TypedList::new(self.list.as_list(), self.resolver)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn push(&mut self, row: Option<RowHandle>) -> Result<()> {
        let stored = self.resolver.local_index(row)?;
        self.list.push(stored);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, row: Option<RowHandle>) -> Result<()> {
        let stored = self.resolver.local_index(row)?;
        self.list.insert(index, stored)
    }

    pub fn set(&mut self, index: usize, row: Option<RowHandle>) -> Result<()> {
        let stored = self.resolver.local_index(row)?;
        self.list.set(index, stored)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Option<RowHandle>> {
        let stored = self.list.remove_at(index)?;
        self.resolver.get(stored)
    }

    pub fn remove(&mut self, row: Option<RowHandle>) -> Result<bool> {
        let stored = self.resolver.local_index(row)?;
        Ok(self.list.remove(stored))
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    pub fn set_to(&mut self, rows: impl IntoIterator<Item = Option<RowHandle>>) -> Result<()> {
        let stored = rows
            .into_iter()
            .map(|row| self.resolver.local_index(row))
            .collect::<Result<Vec<_>>>()?;
        self.list.set_to(stored);
        Ok(())
    }
}
