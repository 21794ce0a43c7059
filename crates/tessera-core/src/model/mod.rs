//! Tables and databases composed from columns.

pub mod database;
pub mod schema;
pub mod table;

pub use database::{Database, TableBuilder};
pub use schema::{ColumnSchema, DatabaseSchema, TableSchema};
pub use table::{ColumnReferences, Table};
