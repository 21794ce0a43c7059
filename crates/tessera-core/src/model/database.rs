use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::column::{AnyColumn, FieldType, build_column};
use crate::error::{AccessError, Result, SchemaError};
use crate::io::{
    self, DiagnosticsReader, TreeDiagnostics, TreeFormat, TreeReader, TreeSerializable,
    TreeSerializationSettings, TreeWriter,
};
use crate::types::{NULL_INDEX, TableId};
use crate::value::Value;

use super::schema::DatabaseSchema;
use super::table::Table;

/// A named set of tables; the unit of persistence.
pub struct Database {
    name: String,
    tables: Vec<Table>,
    by_name: HashMap<String, TableId>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Build an empty database laid out as `schema` describes.
    pub fn from_schema(schema: &DatabaseSchema) -> Result<Self> {
        let mut db = Self::new(schema.name.as_str());
        for table in &schema.tables {
            let mut builder = db.create_table(table.name.as_str());
            for column in &table.columns {
                builder = match &column.default {
                    Some(default) => builder.column_with_default(
                        column.name.as_str(),
                        column.field_type.clone(),
                        default.clone(),
                    ),
                    None => builder.column(column.name.as_str(), column.field_type.clone()),
                };
            }
            builder.execute()?;
        }
        Ok(db)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn create_table(&mut self, name: impl Into<String>) -> TableBuilder<'_> {
        TableBuilder::new(self, name.into())
    }

    /// Register an empty table with no columns.
    pub fn add_table(&mut self, name: impl Into<String>) -> Result<TableId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(SchemaError::TableAlreadyExists(name).into());
        }
        let id = TableId(self.tables.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.tables.push(Table::new(id, name));
        Ok(id)
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.by_name.get(name).copied()
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        let id = self
            .table_id(name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))?;
        Ok(&self.tables[id.0 as usize])
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        let id = self
            .table_id(name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))?;
        Ok(&mut self.tables[id.0 as usize])
    }

    pub fn table_by_id(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.0 as usize)
    }

    pub fn table_by_id_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id.0 as usize)
    }

    /// Tables in creation order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Remove every row of every table.
    pub fn clear(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
    }

    pub fn trim(&mut self) {
        for table in &mut self.tables {
            table.trim();
        }
    }

    /// Check that every stored reference is `-1` or a row of its target table.
    pub fn validate_references(&self) -> Result<()> {
        for table in &self.tables {
            for column in table.references() {
                let target = self.table(column.target)?;
                for (row, value) in column.references {
                    if value < NULL_INDEX || value as usize >= target.len() {
                        return Err(AccessError::InvalidReference {
                            table: table.name().to_string(),
                            column: column.column.to_string(),
                            row,
                            value,
                            target: target.name().to_string(),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, out: W, format: TreeFormat) -> Result<()> {
        io::write_to(self, format, out)
    }

    /// Replace every table's contents with what `input` holds.
    pub fn read_from<R: Read>(
        &mut self,
        input: R,
        format: TreeFormat,
        settings: &TreeSerializationSettings,
    ) -> Result<()> {
        io::read_from(self, format, input, settings)
    }

    /// Like [`read_from`](Self::read_from), also reporting the encoded size
    /// of every table and column.
    pub fn read_with_diagnostics<R: Read>(
        &mut self,
        input: R,
        format: TreeFormat,
        settings: &TreeSerializationSettings,
    ) -> Result<TreeDiagnostics> {
        let inner = format.reader(input, *settings)?;
        let mut reader = DiagnosticsReader::new(inner, "Database");
        self.read_tree(&mut reader)?;
        io::expect_end(&reader)?;
        Ok(reader.into_diagnostics())
    }

    pub fn save(&self, path: impl AsRef<Path>, format: TreeFormat) -> Result<()> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out, format)?;
        out.flush()?;
        debug!(path = %path.display(), ?format, tables = self.tables.len(), "saved database");
        Ok(())
    }

    pub fn load(
        &mut self,
        path: impl AsRef<Path>,
        format: TreeFormat,
        settings: &TreeSerializationSettings,
    ) -> Result<()> {
        let path = path.as_ref();
        self.read_from(BufReader::new(File::open(path)?), format, settings)?;
        debug!(path = %path.display(), ?format, "loaded database");
        Ok(())
    }

    pub fn load_with_diagnostics(
        &mut self,
        path: impl AsRef<Path>,
        format: TreeFormat,
        settings: &TreeSerializationSettings,
    ) -> Result<TreeDiagnostics> {
        let path = path.as_ref();
        let diagnostics =
            self.read_with_diagnostics(BufReader::new(File::open(path)?), format, settings)?;
        debug!(path = %path.display(), size = diagnostics.size, unit = ?diagnostics.unit, "loaded database with diagnostics");
        Ok(diagnostics)
    }
}

impl TreeSerializable for Database {
    fn write_tree(&self, writer: &mut dyn TreeWriter) -> Result<()> {
        writer.start_object()?;
        for table in &self.tables {
            writer.write_property(table.name(), table)?;
        }
        writer.end_object()
    }

    fn read_tree(&mut self, reader: &mut dyn TreeReader) -> Result<()> {
        self.clear();
        let Self {
            tables, by_name, ..
        } = self;
        reader.read_object(|r, name| match by_name.get(name) {
            Some(id) => {
                tables[id.0 as usize].read_tree(r)?;
                Ok(true)
            }
            None => {
                debug!(table = name, "table not in this schema");
                Ok(false)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// TableBuilder
// ---------------------------------------------------------------------------

enum PendingColumn {
    Field(FieldType, Option<Value>),
    Built(Box<dyn AnyColumn>),
}

/// Builder for adding a table to a [`Database`].
///
/// Nothing is registered until [`execute`](Self::execute) succeeds.
pub struct TableBuilder<'a> {
    db: &'a mut Database,
    name: String,
    columns: Vec<(String, PendingColumn)>,
}

impl<'a> TableBuilder<'a> {
    pub(crate) fn new(db: &'a mut Database, name: String) -> Self {
        Self {
            db,
            name,
            columns: Vec::new(),
        }
    }

    /// Add a column of `field_type` with the type's default value.
    pub fn column(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.columns
            .push((name.into(), PendingColumn::Field(field_type, None)));
        self
    }

    pub fn column_with_default(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        default: impl Into<Value>,
    ) -> Self {
        self.columns.push((
            name.into(),
            PendingColumn::Field(field_type, Some(default.into())),
        ));
        self
    }

    /// Add an already constructed column.
    pub fn typed_column(mut self, name: impl Into<String>, column: impl AnyColumn + 'static) -> Self {
        self.columns
            .push((name.into(), PendingColumn::Built(Box::new(column))));
        self
    }

    /// Build every column and register the table.
    pub fn execute(self) -> Result<TableId> {
        if self.db.by_name.contains_key(&self.name) {
            return Err(SchemaError::TableAlreadyExists(self.name).into());
        }
        let mut table = Table::new(TableId(self.db.tables.len() as u32), self.name.as_str());
        for (name, pending) in self.columns {
            let column = match pending {
                PendingColumn::Field(field_type, default) => build_column(&field_type, default)?,
                PendingColumn::Built(column) => column,
            };
            table.add_column(name, column)?;
        }

        let id = table.id();
        debug!(table = %self.name, columns = table.column_names().count(), "created table");
        self.db.by_name.insert(self.name, id);
        self.db.tables.push(table);
        Ok(id)
    }
}
