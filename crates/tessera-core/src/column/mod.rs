//! Columns: one field stored for every row of a table.
//!
//! [`Column`] is the typed contract every storage type implements.
//! [`AnyColumn`] is its object-safe, type-erased face, which tables hold,
//! and [`DynColumn`] turns a type-erased column back into a `Column` whose
//! items are [`Value`]s so that factory-built columns can be nested.

pub mod boolean;
pub mod chapter;
pub mod datetime;
pub mod distinct;
pub mod factory;
pub mod number;
pub mod reference;
pub mod string;
pub mod variable;

use std::any::Any;

use tracing::warn;

use crate::error::Result;
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::value::Value;

pub use boolean::BooleanColumn;
pub use chapter::Chapter;
pub use datetime::DateTimeColumn;
pub use distinct::DistinctColumn;
pub use factory::{FieldType, build_column};
pub use number::{Number, NumberColumn};
pub use reference::{RefColumn, RefListColumn};
pub use string::StringColumn;
pub use variable::VariableLengthColumn;

/// Storage for one field across all rows.
///
/// Reads never fail: any index at or beyond `len()` yields the column's
/// default item without growing storage. `set` is the only growth path and
/// default-fills every position it skips over.
pub trait Column: TreeSerializable {
    type Item: Clone;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Self::Item;

    fn set(&mut self, index: usize, value: Self::Item);

    /// Reset to the empty state.
    fn clear(&mut self);

    /// Drop the last `count` rows. Removing more rows than exist empties the column.
    fn remove_from_end(&mut self, count: usize);

    fn swap(&mut self, a: usize, b: usize) {
        let first = self.get(a);
        let second = self.get(b);
        self.set(a, second);
        self.set(b, first);
    }

    /// Compact physical storage. Never changes what `get` returns.
    fn trim(&mut self) {}

    /// Extend the column to at least `len` rows.
    fn grow_to(&mut self, len: usize) {
        if len > self.len() {
            let last = self.get(len - 1);
            self.set(len - 1, last);
        }
    }

    fn default_item(&self) -> Self::Item {
        self.get(self.len())
    }

    fn item_to_value(&self, item: Self::Item) -> Value;

    /// Convert a dynamic value to an item. `Value::Null` maps to the default.
    fn item_from_value(&self, value: Value) -> Result<Self::Item>;

    /// Name of the table whose rows this column stores references to.
    fn reference_target(&self) -> Option<&str> {
        None
    }

    /// Every stored `(row, reference)` pair other than the null sentinel.
    fn references(&self) -> Vec<(usize, i32)> {
        Vec::new()
    }
}

/// Type-erased column operations used by tables.
pub trait AnyColumn: TreeSerializable {
    fn row_count(&self) -> usize;
    fn clear_rows(&mut self);
    fn trim_storage(&mut self);
    fn swap_rows(&mut self, a: usize, b: usize);
    fn remove_rows_from_end(&mut self, count: usize);
    fn grow_rows_to(&mut self, len: usize);
    fn get_value(&self, index: usize) -> Value;
    fn set_value(&mut self, index: usize, value: Value) -> Result<()>;
    /// Normalize a value to the exact variant this column stores.
    fn convert_value(&self, value: Value) -> Result<Value>;
    fn default_value(&self) -> Value;
    fn target_table(&self) -> Option<&str>;
    fn stored_references(&self) -> Vec<(usize, i32)>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Column + 'static> AnyColumn for C {
    fn row_count(&self) -> usize {
        self.len()
    }

    fn clear_rows(&mut self) {
        self.clear();
    }

    fn trim_storage(&mut self) {
        self.trim();
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        self.swap(a, b);
    }

    fn remove_rows_from_end(&mut self, count: usize) {
        self.remove_from_end(count);
    }

    fn grow_rows_to(&mut self, len: usize) {
        self.grow_to(len);
    }

    fn get_value(&self, index: usize) -> Value {
        self.item_to_value(self.get(index))
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<()> {
        let item = self.item_from_value(value)?;
        self.set(index, item);
        Ok(())
    }

    fn convert_value(&self, value: Value) -> Result<Value> {
        Ok(self.item_to_value(self.item_from_value(value)?))
    }

    fn default_value(&self) -> Value {
        self.item_to_value(self.default_item())
    }

    fn target_table(&self) -> Option<&str> {
        self.reference_target()
    }

    fn stored_references(&self) -> Vec<(usize, i32)> {
        self.references()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A boxed [`AnyColumn`] exposed as a `Column` of [`Value`]s.
pub struct DynColumn(Box<dyn AnyColumn>);

impl DynColumn {
    pub fn new(inner: Box<dyn AnyColumn>) -> Self {
        Self(inner)
    }

    pub fn inner(&self) -> &dyn AnyColumn {
        self.0.as_ref()
    }

    pub fn inner_mut(&mut self) -> &mut dyn AnyColumn {
        self.0.as_mut()
    }

    pub fn into_inner(self) -> Box<dyn AnyColumn> {
        self.0
    }
}

impl TreeSerializable for DynColumn {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        self.0.write_tree(writer)
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.0.read_tree(reader)
    }
}

impl Column for DynColumn {
    type Item = Value;

    fn len(&self) -> usize {
        self.0.row_count()
    }

    fn get(&self, index: usize) -> Value {
        self.0.get_value(index)
    }

    fn set(&mut self, index: usize, value: Value) {
        if let Err(err) = self.0.set_value(index, value) {
            warn!(%err, index, "value does not fit column; storing the default");
            self.0.grow_rows_to(index + 1);
        }
    }

    fn clear(&mut self) {
        self.0.clear_rows();
    }

    fn remove_from_end(&mut self, count: usize) {
        self.0.remove_rows_from_end(count);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.0.swap_rows(a, b);
    }

    fn trim(&mut self) {
        self.0.trim_storage();
    }

    fn grow_to(&mut self, len: usize) {
        self.0.grow_rows_to(len);
    }

    fn default_item(&self) -> Value {
        self.0.default_value()
    }

    fn item_to_value(&self, item: Value) -> Value {
        item
    }

    fn item_from_value(&self, value: Value) -> Result<Value> {
        self.0.convert_value(value)
    }

    fn reference_target(&self) -> Option<&str> {
        self.0.target_table()
    }

    fn references(&self) -> Vec<(usize, i32)> {
        self.0.stored_references()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dyn_column_converts_values() {
        let mut column = DynColumn::new(Box::new(NumberColumn::<u16>::new(7)));
        assert_eq!(column.get(3), Value::U16(7));

        column.set(2, Value::I32(40));
        assert_eq!(column.len(), 3);
        assert_eq!(column.get(2), Value::U16(40));
        assert_eq!(column.get(0), Value::U16(7));
    }

    #[test]
    fn test_dyn_column_rejected_value_still_grows() {
        let mut column = DynColumn::new(Box::new(NumberColumn::<u8>::new(0)));
        column.set(4, Value::String("nope".into()));
        assert_eq!(column.len(), 5);
        assert_eq!(column.get(4), Value::U8(0));
    }

    #[test]
    fn test_any_column_downcast() {
        let column: Box<dyn AnyColumn> = Box::new(StringColumn::new());
        assert!(column.as_any().downcast_ref::<StringColumn>().is_some());
        assert!(column.as_any().downcast_ref::<NumberColumn<i32>>().is_none());
    }
}
