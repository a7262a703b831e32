use super::{MigrationBackend, Savepoint, SchemaEditor};
use crate::core::{DataType, MutantError, Result, Value};
use crate::proxy::Record;
use crate::synth::{FieldDescriptor, RuntimeType};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Level, event};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub auto_increment: bool,
}

impl Column {
    fn from_field(field: &FieldDescriptor) -> Self {
        Self {
            name: field.column.clone(),
            data_type: field.data_type,
            nullable: field.nullable,
            primary_key: field.primary_key,
            unique: field.unique || field.primary_key,
            auto_increment: field.auto_increment,
        }
    }

    fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(MutantError::Migration(format!(
                    "column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }
        if !self.data_type.is_compatible(value) {
            return Err(MutantError::Migration(format!(
                "column '{}' expects {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }
        Ok(())
    }
}

/// A schema operation as applied, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaOperation {
    CreateTable { table: String, columns: Vec<String> },
    DropTable { table: String },
    RenameTable { from: String, to: String },
    AddColumn { table: String, column: String },
    AlterColumn { table: String, from: String, to: String },
    RemoveColumn { table: String, column: String },
    DropUnique { table: String, columns: Vec<String> },
    CreateUnique { table: String, columns: Vec<String> },
}

impl fmt::Display for SchemaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table, columns } => {
                write!(f, "CREATE TABLE {} ({})", table, columns.join(", "))
            }
            Self::DropTable { table } => write!(f, "DROP TABLE {}", table),
            Self::RenameTable { from, to } => write!(f, "RENAME TABLE {} TO {}", from, to),
            Self::AddColumn { table, column } => write!(f, "ALTER TABLE {} ADD {}", table, column),
            Self::AlterColumn { table, from, to } => {
                write!(f, "ALTER TABLE {} ALTER {} TO {}", table, from, to)
            }
            Self::RemoveColumn { table, column } => {
                write!(f, "ALTER TABLE {} DROP {}", table, column)
            }
            Self::DropUnique { table, columns } => {
                write!(f, "ALTER TABLE {} DROP UNIQUE ({})", table, columns.join(", "))
            }
            Self::CreateUnique { table, columns } => {
                write!(f, "ALTER TABLE {} ADD UNIQUE ({})", table, columns.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    unique_together: Vec<Vec<String>>,
    next_key: i64,
}

impl Table {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    fn renumber(&mut self, index: usize) {
        for (position, row) in self.rows.iter_mut().enumerate() {
            row[index] = Value::Integer(position as i64 + 1);
        }
        self.next_key = self.rows.len() as i64 + 1;
    }

    fn validate_row(&self, row: &[Value]) -> Result<()> {
        for (column, value) in self.columns.iter().zip(row) {
            column.validate(value)?;
        }
        Ok(())
    }

    fn check_uniqueness(&self) -> Result<()> {
        for (index, column) in self.columns.iter().enumerate() {
            if column.unique {
                self.check_unique_set(&[index], &column.name)?;
            }
        }
        for set in &self.unique_together {
            let indexes = set
                .iter()
                .map(|name| {
                    self.column_index(name).ok_or_else(|| {
                        MutantError::Migration(format!("unknown column '{}' in unique set", name))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            self.check_unique_set(&indexes, &set.join(", "))?;
        }
        Ok(())
    }

    fn check_unique_set(&self, indexes: &[usize], label: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for row in &self.rows {
            let key: Vec<&Value> = indexes.iter().map(|index| &row[*index]).collect();
            if key.iter().any(|value| value.is_null()) {
                continue;
            }
            if !seen.insert(key) {
                return Err(MutantError::Migration(format!(
                    "unique constraint violation on ({})",
                    label
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct DatabaseState {
    tables: im::HashMap<String, Table>,
    journal: im::Vector<SchemaOperation>,
}

impl DatabaseState {
    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| MutantError::Migration(format!("table '{}' does not exist", name)))
    }

    fn record(&mut self, operation: SchemaOperation) {
        event!(Level::INFO, operation = %operation, "schema operation applied");
        self.journal.push_back(operation);
    }
}

/// In-process migration backend keeping tables, rows and a journal of the
/// schema operations applied to it.
pub struct MemoryDatabase {
    state: Mutex<DatabaseState>,
    savepoints: Mutex<BTreeMap<u64, DatabaseState>>,
    next_savepoint: AtomicU64,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DatabaseState::default()),
            savepoints: Mutex::new(BTreeMap::new()),
            next_savepoint: AtomicU64::new(1),
        }
    }

    /// Every schema operation applied so far, oldest first.
    pub fn journal(&self) -> Result<Vec<SchemaOperation>> {
        Ok(self.state.lock()?.journal.iter().cloned().collect())
    }

    pub fn clear_journal(&self) -> Result<()> {
        self.state.lock()?.journal.clear();
        Ok(())
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock()?.tables.contains_key(name))
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.state.lock()?.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let state = self.state.lock()?;
        let table = state
            .tables
            .get(table)
            .ok_or_else(|| MutantError::NotFound(format!("table '{}'", table)))?;
        Ok(table.columns.clone())
    }

    pub fn unique_together(&self, table: &str) -> Result<Vec<Vec<String>>> {
        let state = self.state.lock()?;
        let table = state
            .tables
            .get(table)
            .ok_or_else(|| MutantError::NotFound(format!("table '{}'", table)))?;
        Ok(table.unique_together.clone())
    }

    /// Stored rows keyed by column name.
    pub fn rows(&self, table: &str) -> Result<Vec<BTreeMap<String, Value>>> {
        let state = self.state.lock()?;
        let table = state
            .tables
            .get(table)
            .ok_or_else(|| MutantError::NotFound(format!("table '{}'", table)))?;
        Ok(table
            .rows
            .iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .map(|column| column.name.clone())
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect())
    }

    /// Store `record` in the table of `runtime`; returns its primary key.
    pub fn insert(&self, runtime: &RuntimeType, record: &Record) -> Result<Value> {
        let mut state = self.state.lock()?;
        let table = state.table_mut(runtime.table_name())?;

        let values: BTreeMap<String, Value> = record.columns(runtime).into_iter().collect();
        let mut row = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            let value = values.get(&column.name).cloned().unwrap_or(Value::Null);
            let value = if column.auto_increment && value.is_null() {
                Value::Integer(table.next_key)
            } else {
                value
            };
            row.push(value);
        }
        table.validate_row(&row)?;

        let key = table
            .columns
            .iter()
            .position(|column| column.primary_key)
            .map(|index| row[index].clone())
            .unwrap_or(Value::Null);
        if let Value::Integer(number) = key {
            table.next_key = table.next_key.max(number + 1);
        }

        table.rows.push(row);
        if let Err(err) = table.check_uniqueness() {
            table.rows.pop();
            return Err(err);
        }
        Ok(key)
    }
}

impl MigrationBackend for MemoryDatabase {
    fn atomic(&self, work: &mut dyn FnMut(&mut dyn SchemaEditor) -> Result<()>) -> Result<()> {
        let mut state = self.state.lock()?;
        let mut editor = MemoryEditor {
            state: state.clone(),
        };
        match work(&mut editor) {
            Ok(()) => {
                *state = editor.state;
                Ok(())
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "schema operation rejected");
                Err(err)
            }
        }
    }

    fn savepoint(&self) -> Result<Savepoint> {
        let snapshot = self.state.lock()?.clone();
        let id = self.next_savepoint.fetch_add(1, Ordering::SeqCst);
        self.savepoints.lock()?.insert(id, snapshot);
        Ok(Savepoint(id))
    }

    fn rollback_to(&self, savepoint: Savepoint) -> Result<()> {
        let mut savepoints = self.savepoints.lock()?;
        let snapshot = savepoints.remove(&savepoint.0).ok_or_else(|| {
            MutantError::Migration(format!("unknown savepoint {}", savepoint.0))
        })?;
        savepoints.retain(|id, _| *id < savepoint.0);
        *self.state.lock()? = snapshot;
        Ok(())
    }

    fn release(&self, savepoint: Savepoint) -> Result<()> {
        self.savepoints.lock()?.remove(&savepoint.0);
        Ok(())
    }
}

/// Works on a private copy of the database state.
struct MemoryEditor {
    state: DatabaseState,
}

impl MemoryEditor {
    fn fill_value(
        table: &Table,
        field: &FieldDescriptor,
    ) -> Result<Value> {
        match &field.default {
            Some(default) => field.data_type.coerce(default).ok_or_else(|| {
                MutantError::Migration(format!(
                    "default {} does not fit column '{}'",
                    default, field.column
                ))
            }),
            None if field.nullable || field.auto_increment || table.rows.is_empty() => {
                Ok(Value::Null)
            }
            None => Err(MutantError::Migration(format!(
                "column '{}' needs a default to fill existing rows",
                field.column
            ))),
        }
    }
}

fn unique_columns(runtime: &RuntimeType, sets: &[Vec<String>]) -> Vec<Vec<String>> {
    sets.iter()
        .map(|set| {
            set.iter()
                .map(|name| {
                    runtime
                        .field(name)
                        .map(|field| field.column.clone())
                        .unwrap_or_else(|| name.clone())
                })
                .collect()
        })
        .collect()
}

impl SchemaEditor for MemoryEditor {
    fn create_table(&mut self, runtime: &RuntimeType) -> Result<()> {
        let name = runtime.table_name().to_string();
        if self.state.tables.contains_key(&name) {
            return Err(MutantError::Migration(format!(
                "table '{}' already exists",
                name
            )));
        }
        let columns: Vec<Column> = runtime.fields().iter().map(Column::from_field).collect();
        let column_names = columns.iter().map(|column| column.name.clone()).collect();
        let unique_together = unique_columns(runtime, &runtime.options().unique_together);
        self.state.tables.insert(
            name.clone(),
            Table {
                columns,
                rows: Vec::new(),
                unique_together,
                next_key: 1,
            },
        );
        self.state.record(SchemaOperation::CreateTable {
            table: name,
            columns: column_names,
        });
        Ok(())
    }

    fn drop_table(&mut self, runtime: &RuntimeType) -> Result<()> {
        let name = runtime.table_name().to_string();
        if self.state.tables.remove(&name).is_none() {
            return Err(MutantError::Migration(format!(
                "table '{}' does not exist",
                name
            )));
        }
        self.state.record(SchemaOperation::DropTable { table: name });
        Ok(())
    }

    fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if self.state.tables.contains_key(new_name) {
            return Err(MutantError::Migration(format!(
                "table '{}' already exists",
                new_name
            )));
        }
        let table = self.state.tables.remove(old_name).ok_or_else(|| {
            MutantError::Migration(format!("table '{}' does not exist", old_name))
        })?;
        self.state.tables.insert(new_name.to_string(), table);
        self.state.record(SchemaOperation::RenameTable {
            from: old_name.to_string(),
            to: new_name.to_string(),
        });
        Ok(())
    }

    fn add_column(&mut self, runtime: &RuntimeType, field: &FieldDescriptor) -> Result<()> {
        let name = runtime.table_name().to_string();
        let table = self.state.table_mut(&name)?;
        if table.column_index(&field.column).is_some() {
            return Err(MutantError::Migration(format!(
                "column '{}' already exists in '{}'",
                field.column, name
            )));
        }

        let fill = Self::fill_value(table, field)?;
        table.columns.push(Column::from_field(field));
        for row in &mut table.rows {
            row.push(fill.clone());
        }
        let index = table.columns.len() - 1;
        if field.auto_increment {
            table.renumber(index);
        }
        table.check_uniqueness()?;

        self.state.record(SchemaOperation::AddColumn {
            table: name,
            column: field.column.clone(),
        });
        Ok(())
    }

    fn alter_column(
        &mut self,
        runtime: &RuntimeType,
        old: &FieldDescriptor,
        new: &FieldDescriptor,
        strict: bool,
    ) -> Result<()> {
        let name = runtime.table_name().to_string();
        let table = self.state.table_mut(&name)?;
        let index = table.column_index(&old.column).ok_or_else(|| {
            MutantError::Migration(format!(
                "column '{}' does not exist in '{}'",
                old.column, name
            ))
        })?;
        if new.column != old.column && table.column_index(&new.column).is_some() {
            return Err(MutantError::Migration(format!(
                "column '{}' already exists in '{}'",
                new.column, name
            )));
        }

        let column = Column::from_field(new);
        if new.auto_increment {
            table.renumber(index);
        } else {
            for row in &mut table.rows {
                let converted = match new.data_type.coerce(&row[index]) {
                    Some(value) => value,
                    None if strict => {
                        return Err(MutantError::Migration(format!(
                            "cannot convert {} in '{}' to {}",
                            row[index], old.column, new.data_type
                        )));
                    }
                    None => new.default.clone().unwrap_or(Value::Null),
                };
                let converted = match (&converted, &new.default) {
                    (Value::Null, Some(default)) if !new.nullable => default.clone(),
                    _ => converted,
                };
                column.validate(&converted)?;
                row[index] = converted;
            }
        }

        table.columns[index] = column;
        for set in &mut table.unique_together {
            for member in set.iter_mut() {
                if *member == old.column {
                    *member = new.column.clone();
                }
            }
        }
        table.check_uniqueness()?;

        self.state.record(SchemaOperation::AlterColumn {
            table: name,
            from: old.column.clone(),
            to: new.column.clone(),
        });
        Ok(())
    }

    fn remove_column(&mut self, runtime: &RuntimeType, field: &FieldDescriptor) -> Result<()> {
        let name = runtime.table_name().to_string();
        let table = self.state.table_mut(&name)?;
        let index = table.column_index(&field.column).ok_or_else(|| {
            MutantError::Migration(format!(
                "column '{}' does not exist in '{}'",
                field.column, name
            ))
        })?;

        table.columns.remove(index);
        for row in &mut table.rows {
            row.remove(index);
        }
        table
            .unique_together
            .retain(|set| !set.contains(&field.column));

        self.state.record(SchemaOperation::RemoveColumn {
            table: name,
            column: field.column.clone(),
        });
        Ok(())
    }

    fn alter_unique_together(
        &mut self,
        runtime: &RuntimeType,
        old: &[Vec<String>],
        new: &[Vec<String>],
    ) -> Result<()> {
        let name = runtime.table_name().to_string();
        let old = unique_columns(runtime, old);
        let new = unique_columns(runtime, new);

        let mut applied = Vec::new();
        {
            let table = self.state.table_mut(&name)?;
            for set in old.iter().filter(|set| !new.contains(set)) {
                table.unique_together.retain(|existing| existing != set);
                applied.push(SchemaOperation::DropUnique {
                    table: name.clone(),
                    columns: set.clone(),
                });
            }
            for set in new.iter().filter(|set| !old.contains(set)) {
                if let Some(missing) = set.iter().find(|column| table.column_index(column).is_none()) {
                    return Err(MutantError::Migration(format!(
                        "column '{}' does not exist in '{}'",
                        missing, name
                    )));
                }
                table.unique_together.push(set.clone());
                applied.push(SchemaOperation::CreateUnique {
                    table: name.clone(),
                    columns: set.clone(),
                });
            }
            table.check_uniqueness()?;
        }

        for operation in applied {
            self.state.record(operation);
        }
        Ok(())
    }
}
