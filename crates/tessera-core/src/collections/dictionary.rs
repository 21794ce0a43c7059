//! Per-row dictionaries.
//!
//! A row stores a list of pair slots. Slot `p` names the key at `keys[p]`
//! and the value at `values[p]`. Keys are distinct-compressed since most
//! dictionaries reuse a small vocabulary of keys.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use tracing::trace;
use xxhash_rust::xxh64::Xxh64;

use crate::column::{Column, DistinctColumn};
use crate::error::{AccessError, FormatError, Result};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::value::Value;

use super::number_list::{NumberList, NumberListColumn};

const KEYS: &str = "Keys";
const VALUES: &str = "Values";
const PAIRS: &str = "Pairs";

pub struct DictionaryColumn<KC: Column, VC: Column> {
    keys: DistinctColumn<KC>,
    values: VC,
    pairs: NumberListColumn<i32>,
}

impl<KC: Column, VC: Column> DictionaryColumn<KC, VC>
where
    KC::Item: Eq + Hash,
{
    /// Build a dictionary column; both inner columns are cleared.
    pub fn new(keys: KC, mut values: VC) -> Self {
        values.clear();
        Self {
            keys: DistinctColumn::new(keys),
            values,
            pairs: NumberListColumn::new(),
        }
    }

    pub fn dictionary(&self, row: usize) -> ColumnDictionary<'_, KC, VC> {
        ColumnDictionary {
            keys: &self.keys,
            values: &self.values,
            pairs: self.pairs.list(row),
        }
    }

    pub fn dictionary_mut(&mut self, row: usize) -> ColumnDictionaryMut<'_, KC, VC> {
        ColumnDictionaryMut { column: self, row }
    }

    /// Pair slots allocated so far, holes included.
    pub fn slot_count(&self) -> usize {
        self.keys.len().max(self.values.len())
    }

    pub fn keys(&self) -> &DistinctColumn<KC> {
        &self.keys
    }

    fn is_compact(&self) -> bool {
        let mut next = 0usize;
        for row in 0..self.pairs.len() {
            for slot in self.pairs.slice(row) {
                if *slot as usize != next {
                    return false;
                }
                next += 1;
            }
        }
        next == self.slot_count()
    }
}

/// Read-only view of one row's dictionary.
pub struct ColumnDictionary<'a, KC: Column, VC: Column> {
    keys: &'a DistinctColumn<KC>,
    values: &'a VC,
    pairs: NumberList<'a, i32>,
}

impl<'a, KC: Column, VC: Column> ColumnDictionary<'a, KC, VC>
where
    KC::Item: Eq + Hash,
{
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn slot_of(&self, key: &KC::Item) -> Option<usize> {
        self.pairs
            .iter()
            .map(|slot| slot as usize)
            .find(|slot| self.keys.get(*slot) == *key)
    }

    pub fn get(&self, key: &KC::Item) -> Option<VC::Item> {
        self.slot_of(key).map(|slot| self.values.get(slot))
    }

    /// Like `get`, but a missing key is an error naming the keys present.
    pub fn value(&self, key: &KC::Item) -> Result<VC::Item> {
        self.get(key).ok_or_else(|| {
            let available: Vec<String> = self
                .keys()
                .map(|k| self.keys.item_to_value(k).to_string())
                .collect();
            AccessError::KeyNotFound {
                key: self.keys.item_to_value(key.clone()).to_string(),
                available: available.join(", "),
            }
            .into()
        })
    }

    pub fn contains_key(&self, key: &KC::Item) -> bool {
        self.slot_of(key).is_some()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (KC::Item, VC::Item)> + use<'a, KC, VC> {
        let (keys, values) = (self.keys, self.values);
        self.pairs.iter().map(move |slot| {
            let slot = slot as usize;
            (keys.get(slot), values.get(slot))
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = KC::Item> + use<'a, KC, VC> {
        let keys = self.keys;
        self.pairs.iter().map(move |slot| keys.get(slot as usize))
    }

    pub fn values(&self) -> impl Iterator<Item = VC::Item> + use<'a, KC, VC> {
        let values = self.values;
        self.pairs.iter().map(move |slot| values.get(slot as usize))
    }

    pub fn to_map(&self) -> HashMap<KC::Item, VC::Item> {
        self.iter().collect()
    }
}

impl<KC: Column, VC: Column> PartialEq for ColumnDictionary<'_, KC, VC>
where
    KC::Item: Eq + Hash,
    VC::Item: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        if self.iter().zip(other.iter()).all(|(a, b)| a == b) {
            return true;
        }
        self.iter().all(|(k, v)| other.get(&k).is_some_and(|o| o == v))
    }
}

impl<KC: Column, VC: Column> PartialEq<HashMap<KC::Item, VC::Item>> for ColumnDictionary<'_, KC, VC>
where
    KC::Item: Eq + Hash,
    VC::Item: PartialEq,
{
    fn eq(&self, other: &HashMap<KC::Item, VC::Item>) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(&k) == Some(&v))
    }
}

impl<KC: Column, VC: Column> Eq for ColumnDictionary<'_, KC, VC>
where
    KC::Item: Eq + Hash,
    VC::Item: Eq,
{
}

impl<KC: Column, VC: Column> Hash for ColumnDictionary<'_, KC, VC>
where
    KC::Item: Eq + Hash,
    VC::Item: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut combined = 0u64;
        for (k, v) in self.iter() {
            let mut hk = Xxh64::new(0);
            k.hash(&mut hk);
            let mut hv = Xxh64::new(0);
            v.hash(&mut hv);
            combined ^= hk.finish() ^ hv.finish().wrapping_mul(31);
        }
        self.len().hash(state);
        combined.hash(state);
    }
}

/// Mutable view of one row's dictionary.
pub struct ColumnDictionaryMut<'a, KC: Column, VC: Column> {
    column: &'a mut DictionaryColumn<KC, VC>,
    row: usize,
}

impl<KC: Column, VC: Column> ColumnDictionaryMut<'_, KC, VC>
where
    KC::Item: Eq + Hash,
{
    pub fn as_dictionary(&self) -> ColumnDictionary<'_, KC, VC> {
        self.column.dictionary(self.row)
    }

    pub fn len(&self) -> usize {
        self.as_dictionary().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &KC::Item) -> Option<VC::Item> {
        self.as_dictionary().get(key)
    }

    pub fn contains_key(&self, key: &KC::Item) -> bool {
        self.as_dictionary().contains_key(key)
    }

    fn new_slot(&mut self, key: KC::Item, value: VC::Item) -> i32 {
        let slot = self.column.slot_count();
        self.column.keys.set(slot, key);
        self.column.values.set(slot, value);
        slot as i32
    }

    /// Insert or overwrite `key`.
    pub fn insert(&mut self, key: KC::Item, value: VC::Item) {
        let existing = self.as_dictionary().slot_of(&key);
        match existing {
            Some(slot) => self.column.values.set(slot, value),
            None => {
                let slot = self.new_slot(key, value);
                self.column.pairs.list_mut(self.row).push(slot);
            }
        }
    }

    /// Insert `key`, failing if it is already present.
    pub fn add(&mut self, key: KC::Item, value: VC::Item) -> Result<()> {
        if self.contains_key(&key) {
            let key = self.column.keys.item_to_value(key).to_string();
            return Err(AccessError::DuplicateKey(key).into());
        }
        let slot = self.new_slot(key, value);
        self.column.pairs.list_mut(self.row).push(slot);
        Ok(())
    }

    /// Remove `key`, returning its value. The pair slot stays allocated until trim.
    pub fn remove(&mut self, key: &KC::Item) -> Option<VC::Item> {
        let slot = self.as_dictionary().slot_of(key)?;
        let value = self.column.values.get(slot);
        self.column.pairs.list_mut(self.row).remove(slot as i32);
        Some(value)
    }

    /// Remove every entry and reset the vacated slots to defaults.
    pub fn clear(&mut self) {
        let slots = self.column.pairs.list(self.row).to_vec();
        self.reset_slots(&slots);
        self.column.pairs.list_mut(self.row).clear();
    }

    fn reset_slots(&mut self, slots: &[i32]) {
        let key = self.column.keys.default_item();
        let value = self.column.values.default_item();
        for slot in slots {
            self.column.keys.set(*slot as usize, key.clone());
            self.column.values.set(*slot as usize, value.clone());
        }
    }

    /// Replace the row's contents, reusing its existing slots first. Later
    /// duplicates of a key overwrite earlier ones.
    pub fn set_to(&mut self, entries: impl IntoIterator<Item = (KC::Item, VC::Item)>) {
        let mut order: Vec<(KC::Item, VC::Item)> = Vec::new();
        let mut seen: HashMap<KC::Item, usize> = HashMap::new();
        for (key, value) in entries {
            match seen.get(&key) {
                Some(&i) => order[i].1 = value,
                None => {
                    seen.insert(key.clone(), order.len());
                    order.push((key, value));
                }
            }
        }

        let existing = self.column.pairs.list(self.row).to_vec();
        let mut slots = Vec::with_capacity(order.len());
        for (i, (key, value)) in order.into_iter().enumerate() {
            match existing.get(i) {
                Some(&slot) => {
                    self.column.keys.set(slot as usize, key);
                    self.column.values.set(slot as usize, value);
                    slots.push(slot);
                }
                None => slots.push(self.new_slot(key, value)),
            }
        }
        if existing.len() > slots.len() {
            self.reset_slots(&existing[slots.len()..]);
        }
        self.column.pairs.list_mut(self.row).set_to(slots);
    }
}

impl<KC: Column, VC: Column> Column for DictionaryColumn<KC, VC>
where
    KC::Item: Eq + Hash,
{
    type Item = Vec<(KC::Item, VC::Item)>;

    fn len(&self) -> usize {
        self.pairs.len()
    }

    fn get(&self, index: usize) -> Self::Item {
        self.dictionary(index).iter().collect()
    }

    fn set(&mut self, index: usize, value: Self::Item) {
        self.dictionary_mut(index).set_to(value);
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
        self.pairs.clear();
    }

    fn remove_from_end(&mut self, count: usize) {
        self.pairs.remove_from_end(count);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.pairs.swap(a, b);
    }

    /// Rewrite pairs in row order and garbage-collect the key map.
    fn trim(&mut self) {
        if !self.is_compact() {
            let rows: Vec<Self::Item> = (0..self.pairs.len()).map(|row| self.get(row)).collect();
            let before = self.slot_count();
            self.keys.clear();
            self.values.clear();
            let mut next = 0usize;
            for (row, entries) in rows.into_iter().enumerate() {
                let mut slots = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    self.keys.set(next, key);
                    self.values.set(next, value);
                    slots.push(next as i32);
                    next += 1;
                }
                self.pairs.set(row, slots);
            }
            trace!(before, after = next, "compacted dictionary pairs");
        }
        self.keys.trim();
        self.values.trim();
        self.pairs.trim();
    }

    fn grow_to(&mut self, len: usize) {
        self.pairs.grow_to(len);
    }

    fn default_item(&self) -> Self::Item {
        Vec::new()
    }

    fn item_to_value(&self, item: Self::Item) -> Value {
        Value::Map(
            item.into_iter()
                .map(|(k, v)| (self.keys.item_to_value(k), self.values.item_to_value(v)))
                .collect(),
        )
    }

    fn item_from_value(&self, value: Value) -> Result<Self::Item> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| Ok((self.keys.item_from_value(k)?, self.values.item_from_value(v)?)))
                .collect(),
            other => Err(other.mismatch("map").into()),
        }
    }
}

impl<KC: Column, VC: Column> TreeSerializable for DictionaryColumn<KC, VC>
where
    KC::Item: Eq + Hash,
{
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        writer.start_object()?;
        writer.write_property(KEYS, &self.keys)?;
        writer.write_property(VALUES, &self.values)?;
        writer.write_property(PAIRS, &self.pairs)?;
        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.clear();
        reader.read_object(|r, name| {
            match name {
                KEYS => self.keys.read_tree(r)?,
                VALUES => self.values.read_tree(r)?,
                PAIRS => self.pairs.read_tree(r)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;

        let slots = self.slot_count();
        for row in 0..self.pairs.len() {
            if let Some(bad) = self
                .pairs
                .slice(row)
                .iter()
                .find(|p| **p < 0 || **p as usize >= slots)
            {
                return Err(FormatError::Corrupt(format!(
                    "dictionary row {row} refers to pair {bad} of {slots}"
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{NumberColumn, StringColumn};
    use crate::error::Error;
    use crate::io::{TreeFormat, from_bytes, to_bytes};
    use std::collections::hash_map::DefaultHasher;

    type Dict = DictionaryColumn<StringColumn, NumberColumn<i32>>;

    fn dict() -> Dict {
        DictionaryColumn::new(StringColumn::new(), NumberColumn::new(0))
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_insert_get_and_missing_key() {
        let mut column = dict();
        let mut d = column.dictionary_mut(0);
        d.insert("a".into(), 1);
        d.insert("b".into(), 2);
        d.insert("a".into(), 3);
        assert_eq!(d.len(), 2);
        assert_eq!(d.get(&"a".into()), Some(3));

        let view = column.dictionary(0);
        let err = view.value(&"zz".into()).unwrap_err();
        assert!(matches!(err, Error::Access(AccessError::KeyNotFound { .. })));
        assert!(err.to_string().contains(r#"available keys: ["a", "b"]"#));
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut column = dict();
        let mut d = column.dictionary_mut(1);
        d.add("k".into(), 1).unwrap();
        let err = d.add("k".into(), 2).unwrap_err();
        assert!(matches!(err, Error::Access(AccessError::DuplicateKey(_))));
        assert_eq!(d.get(&"k".into()), Some(1));
    }

    #[test]
    fn test_equality_ignores_order() {
        let mut column = dict();
        column.set(0, vec![("x".into(), 1), ("y".into(), 2)]);
        column.set(1, vec![("y".into(), 2), ("x".into(), 1)]);
        column.set(2, vec![("y".into(), 2), ("x".into(), 5)]);

        assert!(column.dictionary(0) == column.dictionary(1));
        assert!(column.dictionary(0) != column.dictionary(2));
        assert_eq!(hash_of(&column.dictionary(0)), hash_of(&column.dictionary(1)));

        let map = HashMap::from([("x".to_string(), 1), ("y".to_string(), 2)]);
        assert!(column.dictionary(1) == map);

        let unchanged = hash_of(&column.dictionary(0));
        column.dictionary_mut(1).insert("x".into(), 9);
        assert!(column.dictionary(0) != column.dictionary(1));
        assert_ne!(hash_of(&column.dictionary(1)), unchanged);
        assert_eq!(hash_of(&column.dictionary(0)), unchanged);
    }

    #[test]
    fn test_remove_and_clear_reset_slots() {
        let mut column = dict();
        column.set(0, vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]);
        assert_eq!(column.dictionary_mut(0).remove(&"b".into()), Some(2));
        assert_eq!(column.dictionary(0).len(), 2);
        assert_eq!(column.slot_count(), 3);

        column.dictionary_mut(0).clear();
        assert!(column.dictionary(0).is_empty());
        assert_eq!(column.keys().get(0), "");
        assert_eq!(column.values.get(2), 0);
        assert_eq!(column.values.get(1), 2);
    }

    #[test]
    fn test_trim_compacts_and_preserves_content() {
        let mut column = dict();
        for row in 0..10 {
            column.set(row, vec![(format!("k{}", row % 3), row as i32), ("shared".into(), -1)]);
        }
        column.dictionary_mut(4).remove(&"shared".into());
        column.swap(0, 9);
        let before: Vec<_> = (0..10).map(|row| column.dictionary(row).to_map()).collect();

        column.trim();
        assert_eq!(column.slot_count(), 19);
        for (row, expected) in before.iter().enumerate() {
            assert!(column.dictionary(row) == *expected, "row {row}");
        }
        assert_eq!(column.keys().distinct_count(), Some(5));
    }

    #[test]
    fn test_set_to_reuses_slots() {
        let mut column = dict();
        column.set(0, vec![("a".into(), 1), ("b".into(), 2)]);
        column.dictionary_mut(0).set_to([("c".to_string(), 3), ("c".to_string(), 4)]);
        assert_eq!(column.slot_count(), 2);
        assert_eq!(column.get(0), vec![("c".to_string(), 4)]);
        assert_eq!(column.keys().get(1), "");
    }

    #[test]
    fn test_round_trip() {
        let mut column = dict();
        column.set(2, vec![("p".into(), 7)]);
        for format in [TreeFormat::Binary, TreeFormat::Json] {
            let bytes = to_bytes(&column, format).unwrap();
            let mut read = dict();
            from_bytes(&mut read, format, &bytes, &Default::default()).unwrap();
            assert_eq!(read.len(), 3);
            assert_eq!(read.dictionary(2).value(&"p".into()).unwrap(), 7);
            assert!(read.dictionary(0).is_empty());
        }
    }
}
