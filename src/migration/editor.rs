use crate::core::Result;
use crate::synth::{FieldDescriptor, RuntimeType};

/// Schema operations a migration backend understands.
///
/// `runtime` is always the type after the change; for removals and
/// alterations the affected field is passed explicitly since it may no longer
/// be part of that type.
pub trait SchemaEditor {
    fn create_table(&mut self, runtime: &RuntimeType) -> Result<()>;

    fn drop_table(&mut self, runtime: &RuntimeType) -> Result<()>;

    fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()>;

    fn add_column(&mut self, runtime: &RuntimeType, field: &FieldDescriptor) -> Result<()>;

    /// Change `old` into `new`; with `strict`, fail instead of coercing
    /// stored values that do not fit.
    fn alter_column(
        &mut self,
        runtime: &RuntimeType,
        old: &FieldDescriptor,
        new: &FieldDescriptor,
        strict: bool,
    ) -> Result<()>;

    fn remove_column(&mut self, runtime: &RuntimeType, field: &FieldDescriptor) -> Result<()>;

    /// Replace the unique-together sets `old` with `new`, dropping the sets
    /// that disappear before creating the ones that appear.
    fn alter_unique_together(
        &mut self,
        runtime: &RuntimeType,
        old: &[Vec<String>],
        new: &[Vec<String>],
    ) -> Result<()>;
}

/// Opaque marker returned by [`MigrationBackend::savepoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Savepoint(pub u64);

/// A storage connection able to run schema operations transactionally.
pub trait MigrationBackend: Send + Sync {
    /// Run `work` in one transaction; nothing it did survives an error.
    fn atomic(&self, work: &mut dyn FnMut(&mut dyn SchemaEditor) -> Result<()>) -> Result<()>;

    /// Mark the current state so later work can be undone as a unit.
    fn savepoint(&self) -> Result<Savepoint>;

    /// Undo everything applied after `savepoint`.
    fn rollback_to(&self, savepoint: Savepoint) -> Result<()>;

    /// Forget `savepoint`; the work after it stays.
    fn release(&self, savepoint: Savepoint) -> Result<()>;
}
