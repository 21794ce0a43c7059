//! A table: one row count shared by a fixed set of named columns.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::column::AnyColumn;
use crate::error::{AccessError, Result, SchemaError};
use crate::io::{TreeReader, TreeSerializable, TreeWriter};
use crate::types::{RowHandle, RowResolver, TableId};
use crate::value::Value;

const COUNT: &str = "Count";
const COLUMNS: &str = "Columns";

struct NamedColumn {
    name: String,
    column: Box<dyn AnyColumn>,
}

/// Stored references of one column, as returned by [`Table::references`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnReferences<'a> {
    pub column: &'a str,
    pub target: &'a str,
    pub references: Vec<(usize, i32)>,
}

pub struct Table {
    id: TableId,
    name: String,
    count: usize,
    generation: u64,
    columns: Vec<NamedColumn>,
    by_name: HashMap<String, usize>,
}

impl Table {
    pub(crate) fn new(id: TableId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            count: 0,
            generation: 0,
            columns: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bumped by every operation that moves or drops rows.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Add a column, sized to the current row count.
    pub fn add_column(&mut self, name: impl Into<String>, mut column: Box<dyn AnyColumn>) -> Result<()> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(SchemaError::ColumnAlreadyExists {
                table: self.name.clone(),
                column: name,
            }
            .into());
        }
        column.clear_rows();
        column.grow_rows_to(self.count);
        self.by_name.insert(name.clone(), self.columns.len());
        self.columns.push(NamedColumn { name, column });
        Ok(())
    }

    /// Append a row of defaults and return its index.
    pub fn add(&mut self) -> usize {
        let index = self.count;
        self.count += 1;
        for named in &mut self.columns {
            let rows = named.column.row_count();
            if rows > self.count {
                named.column.remove_rows_from_end(rows - self.count);
            }
            named.column.grow_rows_to(self.count);
        }
        index
    }

    pub fn resolver(&self) -> RowResolver {
        RowResolver::new(self.id, self.generation)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.count {
            return Err(AccessError::IndexOutOfRange {
                index: index as i64,
                len: self.count,
            }
            .into());
        }
        Ok(())
    }

    /// Handle for row `index` under the current generation.
    pub fn row(&self, index: usize) -> Result<RowHandle> {
        self.check_index(index)?;
        Ok(RowHandle::new(self.id, index, self.generation))
    }

    /// Map a stored reference to a handle. `-1` is `None`.
    pub fn get(&self, index: i32) -> Result<Option<RowHandle>> {
        let row = self.resolver().get(index)?;
        if let Some(row) = row {
            self.check_index(row.index())?;
        }
        Ok(row)
    }

    /// Map a handle back to the value a reference column stores for it.
    pub fn local_index(&self, row: Option<RowHandle>) -> Result<i32> {
        if let Some(row) = row {
            self.resolve(row)?;
        }
        self.resolver().local_index(row)
    }

    /// Index of `row`, failing for handles of other tables, older
    /// generations, or removed rows.
    pub fn resolve(&self, row: RowHandle) -> Result<usize> {
        if row.table() != self.id {
            return Err(AccessError::WrongTable.into());
        }
        if row.generation() != self.generation {
            return Err(AccessError::StaleRow.into());
        }
        self.check_index(row.index())?;
        Ok(row.index())
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.by_name.get(name).copied().ok_or_else(|| {
            SchemaError::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            }
            .into()
        })
    }

    pub fn dyn_column(&self, name: &str) -> Result<&dyn AnyColumn> {
        let i = self.position(name)?;
        Ok(self.columns[i].column.as_ref())
    }

    pub fn dyn_column_mut(&mut self, name: &str) -> Result<&mut dyn AnyColumn> {
        let i = self.position(name)?;
        Ok(self.columns[i].column.as_mut())
    }

    /// Typed access to a column.
    pub fn column<C: AnyColumn + 'static>(&self, name: &str) -> Result<&C> {
        self.dyn_column(name)?
            .as_any()
            .downcast_ref::<C>()
            .ok_or_else(|| self.type_mismatch(name))
    }

    /// Typed mutable access to a column.
    ///
    /// Writes through the returned column must stay within `len()` rows;
    /// use [`add`](Self::add) to grow the table. Rows written past the end
    /// are not part of the table and are dropped by the next
    /// [`add`](Self::add) or read.
    pub fn column_mut<C: AnyColumn + 'static>(&mut self, name: &str) -> Result<&mut C> {
        let i = self.position(name)?;
        let mismatch = self.type_mismatch(name);
        self.columns[i]
            .column
            .as_any_mut()
            .downcast_mut::<C>()
            .ok_or(mismatch)
    }

    fn type_mismatch(&self, name: &str) -> crate::error::Error {
        SchemaError::ColumnTypeMismatch {
            table: self.name.clone(),
            column: name.to_string(),
        }
        .into()
    }

    /// Value of `column` at `row`. Rows past the end read as defaults.
    pub fn get_value(&self, row: usize, column: &str) -> Result<Value> {
        Ok(self.dyn_column(column)?.get_value(row))
    }

    pub fn set_value(&mut self, row: usize, column: &str, value: Value) -> Result<()> {
        self.check_index(row)?;
        self.dyn_column_mut(column)?.set_value(row, value)
    }

    pub fn value(&self, row: RowHandle, column: &str) -> Result<Value> {
        let index = self.resolve(row)?;
        self.get_value(index, column)
    }

    pub fn set(&mut self, row: RowHandle, column: &str, value: Value) -> Result<()> {
        let index = self.resolve(row)?;
        self.set_value(index, column, value)
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) -> Result<()> {
        self.check_index(a)?;
        self.check_index(b)?;
        if a != b {
            for named in &mut self.columns {
                named.column.swap_rows(a, b);
            }
            self.generation += 1;
        }
        Ok(())
    }

    /// Remove row `index` by moving the last row into its place.
    ///
    /// Returns the old index of the moved row, if one moved, so callers can
    /// rewrite references to it.
    pub fn swap_remove(&mut self, index: usize) -> Result<Option<usize>> {
        self.check_index(index)?;
        let last = self.count - 1;
        if index != last {
            for named in &mut self.columns {
                named.column.swap_rows(index, last);
            }
        }
        self.remove_from_end(1);
        Ok((index != last).then_some(last))
    }

    pub fn remove_from_end(&mut self, count: usize) {
        let count = count.min(self.count);
        for named in &mut self.columns {
            named.column.remove_rows_from_end(count);
        }
        self.count -= count;
        self.generation += 1;
    }

    /// Remove every row. Columns are kept.
    pub fn clear(&mut self) {
        for named in &mut self.columns {
            named.column.clear_rows();
        }
        self.count = 0;
        self.generation += 1;
    }

    /// Compact every column's storage.
    pub fn trim(&mut self) {
        for named in &mut self.columns {
            named.column.trim_storage();
        }
        debug!(table = %self.name, rows = self.count, "trimmed table");
    }

    /// Stored references of every reference column.
    pub fn references(&self) -> Vec<ColumnReferences<'_>> {
        self.columns
            .iter()
            .filter_map(|named| {
                named.column.target_table().map(|target| ColumnReferences {
                    column: &named.name,
                    target,
                    references: named.column.stored_references(),
                })
            })
            .collect()
    }
}

impl TreeSerializable for Table {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        writer.start_object()?;
        writer.write_i64_property(COUNT, self.count as i64)?;
        writer.property_name(COLUMNS)?;
        writer.start_object()?;
        for named in &self.columns {
            writer.write_property(&named.name, named.column.as_ref())?;
        }
        writer.end_object()?;
        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.clear();
        let mut count = 0;
        let mut seen = HashSet::new();
        let Self {
            name,
            columns,
            by_name,
            ..
        } = self;

        reader.read_object(|r, property| {
            match property {
                COUNT => count = r.read_usize()?,
                COLUMNS => r.read_object(|r, column| match by_name.get(column) {
                    Some(&i) => {
                        columns[i].column.read_tree(r)?;
                        seen.insert(i);
                        Ok(true)
                    }
                    None => {
                        debug!(table = %name, column, "column not in this schema");
                        Ok(false)
                    }
                })?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;

        for (i, named) in self.columns.iter_mut().enumerate() {
            if !seen.contains(&i) {
                debug!(table = %self.name, column = %named.name, "column missing from stream; using defaults");
            }
            let rows = named.column.row_count();
            if rows > count {
                named.column.remove_rows_from_end(rows - count);
            }
            named.column.grow_rows_to(count);
        }
        self.count = count;
        Ok(())
    }
}
