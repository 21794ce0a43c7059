//! Nested per-row collections built from columns of integer positions.
//!
//! Views borrow their column, so a view cannot outlive a `trim` that
//! renumbers the positions it reads.

pub mod dictionary;
pub mod list;
pub mod number_list;
pub mod typed_list;

pub use dictionary::{ColumnDictionary, ColumnDictionaryMut, DictionaryColumn};
pub use list::{ColumnList, ColumnListMut, ListColumn};
pub use number_list::{NumberList, NumberListColumn, NumberListMut};
pub use typed_list::{TypedList, TypedListMut};
