use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};

/// Rows per chapter of a variable-length column.
pub const CHAPTER_ROW_COUNT: usize = 32_768;

/// `log2(CHAPTER_ROW_COUNT)`.
pub const CHAPTER_ROW_SHIFT: usize = 15;

/// Rows per page within a chapter. Offsets restart at every page.
pub const PAGE_ROW_COUNT: usize = 32;

/// `log2(PAGE_ROW_COUNT)`.
pub const PAGE_ROW_SHIFT: usize = 5;

/// Longest value (in elements) stored in a chapter's packed area.
///
/// 32 rows of at most 2,047 elements keep a page's end offsets below `u16::MAX`.
pub const MAX_SMALL_VALUE_LEN: usize = 2_047;

/// Maximum number of entries in a distinct column's value map, the default
/// value included.
pub const DISTINCT_CAP: usize = 256;

/// Stored reference value meaning "no row".
pub const NULL_INDEX: i32 = -1;

/// Identifies a table within its database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

/// A (table, index) reference to one logical row.
///
/// A handle records the layout generation of its table at the time it was
/// issued. Swapping, removing, clearing or reloading rows bumps the
/// generation, after which the handle must be re-resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowHandle {
    table: TableId,
    index: usize,
    generation: u64,
}

impl RowHandle {
    pub(crate) fn new(table: TableId, index: usize, generation: u64) -> Self {
        Self {
            table,
            index,
            generation,
        }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A detached copy of a table's identity and generation.
///
/// Lets views over one table translate stored indices into row handles of
/// another table without borrowing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowResolver {
    table: TableId,
    generation: u64,
}

impl RowResolver {
    pub(crate) fn new(table: TableId, generation: u64) -> Self {
        Self { table, generation }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    /// Map a stored index to a row handle; `-1` maps to `None`.
    pub fn get(&self, index: i32) -> Result<Option<RowHandle>> {
        match index {
            NULL_INDEX => Ok(None),
            i if i < NULL_INDEX => Err(AccessError::IndexOutOfRange {
                index: i64::from(i),
                len: 0,
            }
            .into()),
            i => Ok(Some(RowHandle::new(self.table, i as usize, self.generation))),
        }
    }

    /// Map a row handle back to its stored index; `None` maps to `-1`.
    pub fn local_index(&self, row: Option<RowHandle>) -> Result<i32> {
        let Some(row) = row else {
            return Ok(NULL_INDEX);
        };
        if row.table != self.table {
            return Err(AccessError::WrongTable.into());
        }
        if row.generation != self.generation {
            return Err(AccessError::StaleRow.into());
        }
        i32::try_from(row.index).map_err(|_| {
            AccessError::IndexOutOfRange {
                index: row.index as i64,
                len: i32::MAX as usize,
            }
            .into()
        })
    }
}
