use crate::core::{BaseId, FieldId, Result, SchemaId, UniqueTogetherId, Value};
use crate::synth::RuntimeType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Level, event};

/// Why the events of an operation are being emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOrigin {
    /// Children staged together with their owner; the owner's create-table
    /// covers them.
    OwnerCreation(SchemaId),
    /// Children removed because their owner is; the owner's drop-table covers
    /// them.
    CascadeDeletion(SchemaId),
}

impl OperationOrigin {
    pub fn owner(&self) -> SchemaId {
        match self {
            Self::OwnerCreation(owner) | Self::CascadeDeletion(owner) => *owner,
        }
    }
}

/// Entity a stashed payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Schema(SchemaId),
    Base(BaseId),
    Field(FieldId),
    UniqueTogether(UniqueTogetherId),
}

type Hook = Box<dyn FnOnce() -> Result<()> + Send>;

/// State threaded through every lifecycle event of one store operation.
///
/// Created by the store per transaction and dropped when it ends, so nothing
/// recorded here can leak into another operation.
#[derive(Default)]
pub struct EventContext {
    origin: Option<OperationOrigin>,
    initial_values: HashMap<FieldId, Value>,
    stash: HashMap<EntityRef, Arc<RuntimeType>>,
    installed: HashMap<SchemaId, Arc<RuntimeType>>,
    on_commit: Vec<Hook>,
    on_rollback: Vec<Hook>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> Option<OperationOrigin> {
        self.origin
    }

    /// Run `work` with `origin` in force, restoring the previous origin after.
    pub fn within<T>(&mut self, origin: OperationOrigin, work: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.origin.replace(origin);
        let result = work(self);
        self.origin = previous;
        result
    }

    /// Run `work` as part of deleting `owner`.
    pub fn within_cascade<T>(&mut self, owner: SchemaId, work: impl FnOnce(&mut Self) -> T) -> T {
        self.within(OperationOrigin::CascadeDeletion(owner), work)
    }

    /// Whether DDL for `owner` is covered by the operation in progress.
    pub fn is_subsumed_by(&self, owner: SchemaId) -> bool {
        self.origin.is_some_and(|origin| origin.owner() == owner)
    }

    pub fn is_cascade_of(&self, owner: SchemaId) -> bool {
        self.origin == Some(OperationOrigin::CascadeDeletion(owner))
    }

    /// Transient value used to fill existing rows when `field` is added.
    pub fn set_initial_value(&mut self, field: FieldId, value: Value) {
        self.initial_values.insert(field, value);
    }

    /// Takes the initial value; a second call returns `None`.
    pub fn take_initial_value(&mut self, field: FieldId) -> Option<Value> {
        self.initial_values.remove(&field)
    }

    pub fn stash(&mut self, entity: EntityRef, runtime: Arc<RuntimeType>) {
        self.stash.insert(entity, runtime);
    }

    pub fn take_stash(&mut self, entity: EntityRef) -> Option<Arc<RuntimeType>> {
        self.stash.remove(&entity)
    }

    /// Remember the type an event of this operation installed for `owner`.
    ///
    /// It describes the storage as the operation left it, even after a
    /// dependency's regeneration has flagged it obsolete.
    pub fn record_installed(&mut self, owner: SchemaId, runtime: Arc<RuntimeType>) {
        self.installed.insert(owner, runtime);
    }

    pub fn installed(&self, owner: SchemaId) -> Option<Arc<RuntimeType>> {
        self.installed.get(&owner).cloned()
    }

    /// Run `hook` once the transaction has been committed.
    pub fn on_commit(&mut self, hook: impl FnOnce() -> Result<()> + Send + 'static) {
        self.on_commit.push(Box::new(hook));
    }

    /// Run `hook` if the transaction is discarded; hooks run newest first.
    pub fn on_rollback(&mut self, hook: impl FnOnce() -> Result<()> + Send + 'static) {
        self.on_rollback.push(Box::new(hook));
    }

    pub(crate) fn committed(self) {
        for hook in self.on_commit {
            if let Err(err) = hook() {
                event!(Level::ERROR, error = %err, "commit hook failed");
            }
        }
    }

    pub(crate) fn rolled_back(self) {
        for hook in self.on_rollback.into_iter().rev() {
            if let Err(err) = hook() {
                event!(Level::ERROR, error = %err, "rollback hook failed");
            }
        }
    }
}
