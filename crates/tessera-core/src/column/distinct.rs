//! Distinct-value compression for low-cardinality columns.
//!
//! While mapped, the inner column holds each distinct value once and every
//! row stores a one-byte slot index. The default value always occupies
//! slot 0, so unwritten rows (index 0) read as the default.
//!
//! Once a new value would need more than [`DISTINCT_CAP`] slots the column
//! stores one value per row in the inner column and stays that way.

use std::collections::HashMap;
use std::hash::Hash;

use tracing::debug;

use crate::error::{FormatError, Result};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::types::DISTINCT_CAP;
use crate::value::Value;

use super::Column;
use super::number::NumberColumn;

const INDICES: &str = "Indices";
const VALUES: &str = "Values";

#[derive(Clone)]
struct Mapping<T> {
    slots: HashMap<T, u8>,
    indices: NumberColumn<u8>,
}

impl<T: Eq + Hash> Mapping<T> {
    fn new(default: T) -> Self {
        Self {
            slots: HashMap::from([(default, 0)]),
            indices: NumberColumn::new(0),
        }
    }
}

#[derive(Clone)]
pub struct DistinctColumn<C: Column> {
    values: C,
    mapping: Option<Mapping<C::Item>>,
    default: C::Item,
}

impl<C: Column> DistinctColumn<C>
where
    C::Item: Eq + Hash,
{
    /// Wrap `values`, which is cleared. Its default becomes this column's default.
    pub fn new(values: C) -> Self {
        let default = values.default_item();
        let mut column = Self {
            values,
            mapping: None,
            default,
        };
        column.clear();
        column
    }

    pub fn is_mapping_values(&self) -> bool {
        self.mapping.is_some()
    }

    /// Entries in the value map, the default included. `None` once unmapped.
    pub fn distinct_count(&self) -> Option<usize> {
        self.mapping.as_ref().map(|_| self.values.len())
    }

    /// Slot index stored for `index`, while mapped.
    pub fn slot(&self, index: usize) -> Option<u8> {
        self.mapping.as_ref().map(|m| m.indices.get(index))
    }

    fn unmap(&mut self) {
        let Some(mapping) = self.mapping.take() else {
            return;
        };
        let lookup: Vec<C::Item> = (0..self.values.len()).map(|s| self.values.get(s)).collect();
        let rows = mapping.indices.len();
        debug!(
            distinct = lookup.len(),
            rows, "distinct value cap reached; storing values per row"
        );

        self.values.clear();
        for (row, slot) in mapping.indices.as_slice().iter().enumerate() {
            let value = &lookup[*slot as usize];
            if *value != self.default {
                self.values.set(row, value.clone());
            }
        }
        self.values.grow_to(rows);
    }

    /// Drop slots no row refers to and renumber the survivors densely.
    fn collect_garbage(&mut self) {
        let Some(mapping) = self.mapping.as_mut() else {
            return;
        };
        let slot_count = self.values.len();
        let mut used = vec![false; slot_count];
        used[0] = true;
        for slot in mapping.indices.as_slice() {
            used[*slot as usize] = true;
        }
        let unused = used.iter().filter(|u| !**u).count();
        if unused == 0 {
            return;
        }

        let keep = slot_count - unused;
        let holes = (0..keep).filter(|s| !used[*s]);
        let movers = (keep..slot_count).filter(|s| used[*s]);
        let mut remap: Vec<u8> = (0..slot_count).map(|s| s as u8).collect();
        for (hole, mover) in holes.zip(movers) {
            self.values.swap(hole, mover);
            remap[mover] = hole as u8;
        }
        for slot in mapping.indices.as_mut_slice() {
            *slot = remap[*slot as usize];
        }
        self.values.remove_from_end(unused);

        mapping.slots.clear();
        for s in 0..keep {
            mapping.slots.insert(self.values.get(s), s as u8);
        }
        debug!(removed = unused, remaining = keep, "collected distinct slots");
    }

    /// Put this column's default in slot 0. A stream written with another
    /// default carries that default there instead.
    fn rebase_default(&mut self) {
        if self.mapping.is_none() || self.values.get(0) == self.default {
            return;
        }
        let slot_count = self.values.len();
        let target = match (1..slot_count).find(|s| self.values.get(*s) == self.default) {
            Some(slot) => slot,
            None if slot_count < DISTINCT_CAP => {
                self.values.set(slot_count, self.default.clone());
                slot_count
            }
            None => {
                self.unmap();
                return;
            }
        };
        let Some(mapping) = self.mapping.as_mut() else {
            return;
        };
        self.values.swap(0, target);
        for slot in mapping.indices.as_mut_slice() {
            if *slot == 0 {
                *slot = target as u8;
            } else if *slot as usize == target {
                *slot = 0;
            }
        }
        debug!(slot = target, "moved written default out of slot 0");
    }

    fn validate_mapping(&mut self) -> Result<()> {
        let Some(mapping) = self.mapping.as_ref() else {
            return Ok(());
        };
        if self.values.is_empty() {
            self.values.set(0, self.default.clone());
        }
        let slot_count = self.values.len();
        if slot_count > DISTINCT_CAP {
            return Err(FormatError::Corrupt(format!(
                "distinct column maps {slot_count} values, at most {DISTINCT_CAP} allowed"
            ))
            .into());
        }
        if let Some(bad) = mapping
            .indices
            .as_slice()
            .iter()
            .find(|s| **s as usize >= slot_count)
        {
            return Err(FormatError::Corrupt(format!(
                "distinct index {bad} exceeds {slot_count} mapped values"
            ))
            .into());
        }

        self.rebase_default();
        if let Some(mapping) = self.mapping.as_mut() {
            mapping.slots.clear();
            for s in 0..self.values.len() {
                mapping.slots.entry(self.values.get(s)).or_insert(s as u8);
            }
        }
        Ok(())
    }
}

impl<C: Column> Column for DistinctColumn<C>
where
    C::Item: Eq + Hash,
{
    type Item = C::Item;

    fn len(&self) -> usize {
        match &self.mapping {
            Some(mapping) => mapping.indices.len(),
            None => self.values.len(),
        }
    }

    fn get(&self, index: usize) -> C::Item {
        match &self.mapping {
            Some(mapping) => self.values.get(mapping.indices.get(index) as usize),
            None => self.values.get(index),
        }
    }

    fn set(&mut self, index: usize, value: C::Item) {
        let Some(mapping) = self.mapping.as_mut() else {
            self.values.set(index, value);
            return;
        };
        let slot = match mapping.slots.get(&value) {
            Some(slot) => *slot,
            None if self.values.len() < DISTINCT_CAP => {
                let slot = self.values.len() as u8;
                self.values.set(slot as usize, value.clone());
                mapping.slots.insert(value, slot);
                slot
            }
            None => {
                self.unmap();
                self.values.set(index, value);
                return;
            }
        };
        mapping.indices.set(index, slot);
    }

    fn clear(&mut self) {
        self.values.clear();
        self.values.set(0, self.default.clone());
        self.mapping = Some(Mapping::new(self.default.clone()));
    }

    fn remove_from_end(&mut self, count: usize) {
        match &mut self.mapping {
            Some(mapping) => mapping.indices.remove_from_end(count),
            None => self.values.remove_from_end(count),
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        match &mut self.mapping {
            Some(mapping) => mapping.indices.swap(a, b),
            None => self.values.swap(a, b),
        }
    }

    fn trim(&mut self) {
        self.collect_garbage();
        if let Some(mapping) = &mut self.mapping {
            mapping.indices.trim();
        }
        self.values.trim();
    }

    fn grow_to(&mut self, len: usize) {
        match &mut self.mapping {
            Some(mapping) => mapping.indices.grow_to(len),
            None => self.values.grow_to(len),
        }
    }

    fn default_item(&self) -> C::Item {
        self.default.clone()
    }

    fn item_to_value(&self, item: C::Item) -> Value {
        self.values.item_to_value(item)
    }

    fn item_from_value(&self, value: Value) -> Result<C::Item> {
        self.values.item_from_value(value)
    }
}

impl<C: Column> TreeSerializable for DistinctColumn<C>
where
    C::Item: Eq + Hash,
{
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        writer.start_object()?;
        if let Some(mapping) = &self.mapping {
            writer.write_block_property(INDICES, mapping.indices.as_slice())?;
        }
        writer.write_property(VALUES, &self.values)?;
        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.values.clear();
        self.mapping = None;
        let mut indices = None;
        reader.read_object(|r, name| match name {
            INDICES => {
                indices = Some(r.read_block_of::<u8>()?);
                Ok(true)
            }
            VALUES => {
                self.values.read_tree(r)?;
                Ok(true)
            }
            _ => Ok(false),
        })?;

        if let Some(indices) = indices {
            self.mapping = Some(Mapping {
                slots: HashMap::new(),
                indices: NumberColumn::from_vec(indices, 0),
            });
        }
        self.validate_mapping()
    }
}
