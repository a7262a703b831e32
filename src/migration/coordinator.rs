use super::{ConnectionRegistry, DatabaseRouter, SchemaEditor};
use crate::cache::{Bookkeeping, TypeCache};
use crate::core::{MutantError, Result, SchemaId, TypeKey};
use crate::definition::{
    BaseDefinition, BaseKind, FieldDefinition, OrderingDefinition, RANDOM_ORDERING,
    RelationTarget, SchemaDefinition, UniqueTogetherDefinition,
};
use crate::store::{
    ChangePhase, DefinitionData, EntityRef, EventContext, LifecycleEvent, LifecycleObserver,
};
use crate::synth::{FieldDescriptor, FieldOrigin, RuntimeType};
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// One column-level change implied by a definition change.
#[derive(Debug, Clone, PartialEq)]
enum FieldChange {
    Added(FieldDescriptor),
    Altered(FieldDescriptor, FieldDescriptor),
    Removed(FieldDescriptor),
}

impl FieldChange {
    fn name(&self) -> &str {
        match self {
            Self::Added(field) | Self::Altered(_, field) | Self::Removed(field) => &field.name,
        }
    }
}

/// Pairs the fields a base contributed before and after a change by name.
fn pair_by_name(before: Vec<FieldDescriptor>, after: Vec<FieldDescriptor>) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    for new in &after {
        match before.iter().find(|old| old.name == new.name) {
            Some(old) if old == new => {}
            Some(old) => changes.push(FieldChange::Altered(old.clone(), new.clone())),
            None => changes.push(FieldChange::Added(new.clone())),
        }
    }
    for old in before {
        if !after.iter().any(|new| new.name == old.name) {
            changes.push(FieldChange::Removed(old));
        }
    }
    changes
}

fn implicit_key(runtime: &RuntimeType) -> Option<FieldDescriptor> {
    runtime
        .primary_key()
        .filter(|field| field.is_implicit_key())
        .cloned()
}

/// Issue `changes` and keep the implicit key in step with them.
///
/// A promoted parent link takes the implicit key's place through an
/// alteration, as does the implicit key replacing a removed primary key.
/// Any other appearance or disappearance of the implicit key becomes its own
/// add or remove. A parent link that gains or loses the primary key without
/// a change of its own is altered in place.
fn apply_changes(
    editor: &mut dyn SchemaEditor,
    before: Option<&RuntimeType>,
    after: &RuntimeType,
    changes: &[FieldChange],
    strict: bool,
) -> Result<()> {
    let old_key = before.and_then(implicit_key);
    let new_key = implicit_key(after);
    let mut vanishing_key = old_key.clone().filter(|_| new_key.is_none());
    let mut appearing_key = new_key.filter(|_| old_key.is_none());

    for change in changes {
        match change {
            FieldChange::Added(field) => match vanishing_key.take() {
                Some(key) if field.primary_key && field.parent_link => {
                    editor.alter_column(after, &key, field, strict)?;
                }
                key => {
                    vanishing_key = key;
                    editor.add_column(after, field)?;
                }
            },
            FieldChange::Altered(old, new) => {
                editor.alter_column(after, old, new, strict)?;
            }
            FieldChange::Removed(field) => match appearing_key.take() {
                Some(key) if field.primary_key => {
                    editor.alter_column(after, field, &key, strict)?;
                }
                key => {
                    appearing_key = key;
                    editor.remove_column(after, field)?;
                }
            },
        }
    }

    if let Some(before) = before {
        for new in after.fields().iter().filter(|field| field.parent_link) {
            if changes.iter().any(|change| change.name() == new.name) {
                continue;
            }
            if let Some(old) = before.field(&new.name)
                && old.primary_key != new.primary_key
            {
                editor.alter_column(after, old, new, strict)?;
            }
        }
    }

    if let Some(key) = appearing_key {
        editor.add_column(after, &key)?;
    }
    if let Some(key) = vanishing_key {
        editor.remove_column(after, &key)?;
    }
    Ok(())
}

fn fields_from(runtime: &RuntimeType, origin: FieldOrigin) -> Vec<FieldDescriptor> {
    runtime
        .fields()
        .iter()
        .filter(|field| field.origin == origin)
        .cloned()
        .collect()
}

/// Maps definition lifecycle events to schema operations.
///
/// Each handler synthesizes the owner's replacement type from the staged
/// definitions, runs the implied operations on every routed connection, and
/// only then installs the new type. Savepoints taken per connection are
/// rolled back if the surrounding store transaction fails later on.
pub struct MigrationCoordinator {
    cache: Arc<TypeCache>,
    connections: ConnectionRegistry,
    router: Arc<dyn DatabaseRouter>,
}

impl MigrationCoordinator {
    pub fn new(
        cache: Arc<TypeCache>,
        connections: ConnectionRegistry,
        router: Arc<dyn DatabaseRouter>,
    ) -> Self {
        Self {
            cache,
            connections,
            router,
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    fn strict(&self) -> bool {
        self.cache.config().strict_alterations
    }

    /// The owner's type before the event being handled.
    ///
    /// A type installed earlier in the same operation wins, obsolete or not:
    /// its DDL has already run. Otherwise the cached type, or failing that
    /// the committed definitions, still describe the owner as it was.
    fn previous_type(&self, owner: SchemaId, ctx: &EventContext) -> Option<Arc<RuntimeType>> {
        if let Some(runtime) = ctx.installed(owner) {
            return Some(runtime);
        }
        if let Ok(Some(runtime)) = self.cache.peek(owner)
            && !runtime.is_obsolete()
        {
            return Some(runtime);
        }
        self.cache.committed_type(owner).ok().map(Arc::new)
    }

    /// Run `work` on every connection `runtime` is routed to.
    fn execute(
        &self,
        ctx: &mut EventContext,
        runtime: &RuntimeType,
        work: &mut dyn FnMut(&mut dyn SchemaEditor) -> Result<()>,
    ) -> Result<()> {
        for (alias, backend) in self.connections.routed(self.router.as_ref(), runtime) {
            let savepoint = backend.savepoint()?;
            if let Err(err) = backend.atomic(&mut *work) {
                event!(Level::ERROR, alias = alias, table = runtime.table_name(), error = %err, "migration failed");
                backend.release(savepoint)?;
                return Err(err);
            }
            let undo = backend.clone();
            ctx.on_rollback(move || undo.rollback_to(savepoint));
            let keep = backend.clone();
            ctx.on_commit(move || keep.release(savepoint));
        }
        Ok(())
    }

    /// Synthesize the owner's next type from `staged`, apply `plan` to the
    /// store and install the type.
    fn regenerate(
        &self,
        owner: SchemaId,
        staged: &DefinitionData,
        ctx: &mut EventContext,
        plan: &dyn Fn(Option<&RuntimeType>, &RuntimeType, &mut dyn SchemaEditor) -> Result<()>,
    ) -> Result<Arc<RuntimeType>> {
        let before = self.previous_type(owner, ctx);
        let installed = self.cache.regenerate(owner, staged, |_, after| {
            if after.options().externally_managed {
                event!(Level::DEBUG, table = after.table_name(), "externally managed, skipping DDL");
                return Ok(());
            }
            self.execute(ctx, after, &mut |editor| plan(before.as_deref(), after, editor))
        })?;

        ctx.record_installed(owner, installed.clone());
        let cache = self.cache.clone();
        ctx.on_rollback(move || cache.mark_obsolete(owner));
        Ok(installed)
    }

    /// Cleanup for a child whose DDL is covered by its owner's operation.
    fn subsumed(&self, ctx: &mut EventContext, owner: SchemaId) {
        event!(Level::DEBUG, owner = %owner, "covered by owner operation, skipping DDL");
        if ctx.is_cascade_of(owner) {
            let cache = self.cache.clone();
            ctx.on_commit(move || cache.mark_obsolete(owner));
        }
    }

    fn schema_saved(
        &self,
        schema: &SchemaDefinition,
        previous: Option<&SchemaDefinition>,
        staged: &DefinitionData,
        ctx: &mut EventContext,
    ) -> Result<()> {
        let Some(previous) = previous else {
            self.regenerate(schema.id, staged, ctx, &|_, after, editor| {
                editor.create_table(after)
            })?;
            let cache = self.cache.clone();
            let id = schema.id;
            ctx.on_rollback(move || cache.evict(id).map(|_| ()));
            return Ok(());
        };

        let config = self.cache.config();
        let old_table = config.table_name(&previous.namespace, &previous.type_name);
        let new_table = config.table_name(&schema.namespace, &schema.type_name);
        if old_table == new_table {
            self.regenerate(schema.id, staged, ctx, &|_, _, _| Ok(()))?;
            return Ok(());
        }

        self.regenerate(schema.id, staged, ctx, &|_, _, editor| {
            editor.rename_table(&old_table, &new_table)
        })?;
        let registry = self.cache.registry().clone();
        let old_key = previous.key();
        ctx.on_commit(move || {
            registry.invalidate(&old_key)?;
            registry.clear_name_cache()
        });
        Ok(())
    }

    fn schema_deleting(
        &self,
        schema: &SchemaDefinition,
        staged: &DefinitionData,
        ctx: &mut EventContext,
    ) -> Result<()> {
        let runtime = match self.cache.current_from(schema.id, staged) {
            Ok(runtime) => runtime,
            Err(err) => self.cache.peek(schema.id)?.ok_or(err)?,
        };
        ctx.stash(EntityRef::Schema(schema.id), runtime);
        Ok(())
    }

    fn schema_deleted(&self, schema: &SchemaDefinition, ctx: &mut EventContext) -> Result<()> {
        let runtime = ctx.take_stash(EntityRef::Schema(schema.id)).ok_or_else(|| {
            MutantError::Configuration(format!("no runtime type recorded for {}", schema.id))
        })?;

        if runtime.options().externally_managed {
            event!(Level::DEBUG, table = runtime.table_name(), "externally managed, skipping DDL");
        } else {
            self.execute(ctx, &runtime, &mut |editor| editor.drop_table(&runtime))?;
        }

        let cache = self.cache.clone();
        let id = schema.id;
        let key = schema.key();
        ctx.on_commit(move || {
            cache.evict(id)?;
            cache.registry().invalidate(&key)
        });
        Ok(())
    }

    fn base_changed(
        &self,
        base: &BaseDefinition,
        previous: Option<&BaseDefinition>,
        removed: bool,
        staged: &DefinitionData,
        ctx: &mut EventContext,
    ) -> Result<()> {
        let origin = FieldOrigin::Base(base.id);
        let strict = self.strict();
        let created = !removed && previous.is_none();

        self.regenerate(base.owner, staged, ctx, &|before, after, editor| {
            let old_fields = match before {
                Some(before) if !created => fields_from(before, origin),
                _ => Vec::new(),
            };
            let new_fields = if removed {
                Vec::new()
            } else {
                fields_from(after, origin)
            };
            let changes = pair_by_name(old_fields, new_fields);
            apply_changes(editor, before, after, &changes, strict)
        })?;
        Ok(())
    }

    fn field_saved(
        &self,
        field: &FieldDefinition,
        previous: Option<&FieldDefinition>,
        raw: bool,
        staged: &DefinitionData,
        ctx: &mut EventContext,
    ) -> Result<()> {
        let initial = if raw {
            None
        } else {
            ctx.take_initial_value(field.id)
        };
        let strict = self.strict();
        let old = previous.map(|previous| self.cache.synthesizer().materialize_field(previous));
        let origin = FieldOrigin::Definition(field.id);

        self.regenerate(field.owner, staged, ctx, &|before, after, editor| {
            let Some(new) = fields_from(after, origin).into_iter().next() else {
                return Err(MutantError::Configuration(format!(
                    "field {} missing from synthesized {}",
                    field.id,
                    after.key()
                )));
            };
            let change = match &old {
                Some(old) if *old == new => return Ok(()),
                Some(old) => FieldChange::Altered(old.clone(), new),
                None => match &initial {
                    Some(value) => FieldChange::Added(FieldDescriptor {
                        default: Some(value.clone()),
                        ..new
                    }),
                    None => FieldChange::Added(new),
                },
            };
            apply_changes(editor, before, after, &[change], strict)
        })?;
        Ok(())
    }

    fn field_deleted(
        &self,
        field: &FieldDefinition,
        staged: &DefinitionData,
        ctx: &mut EventContext,
    ) -> Result<()> {
        let strict = self.strict();
        let origin = FieldOrigin::Definition(field.id);
        let fallback = self.cache.synthesizer().materialize_field(field);

        self.regenerate(field.owner, staged, ctx, &|before, after, editor| {
            let old = before
                .and_then(|before| fields_from(before, origin).into_iter().next())
                .unwrap_or_else(|| fallback.clone());
            apply_changes(editor, before, after, &[FieldChange::Removed(old)], strict)
        })?;
        Ok(())
    }

    fn unique_sets_changed(
        &self,
        owner: SchemaId,
        staged: &DefinitionData,
        ctx: &mut EventContext,
        stashed: Option<Arc<RuntimeType>>,
    ) -> Result<()> {
        self.regenerate(owner, staged, ctx, &|before, after, editor| {
            let before = stashed.as_deref().or(before);
            let old_sets = before
                .map(|before| before.options().unique_together.clone())
                .unwrap_or_default();
            let new_sets = &after.options().unique_together;
            if old_sets == *new_sets {
                return Ok(());
            }
            editor.alter_unique_together(after, &old_sets, new_sets)
        })?;
        Ok(())
    }

    fn unique_members_changed(
        &self,
        unique: &UniqueTogetherDefinition,
        phase: ChangePhase,
        staged: &DefinitionData,
        ctx: &mut EventContext,
    ) -> Result<()> {
        let entity = EntityRef::UniqueTogether(unique.id);
        match phase {
            ChangePhase::Pre => {
                if let Some(before) = self.previous_type(unique.owner, ctx) {
                    ctx.stash(entity, before);
                }
                Ok(())
            }
            ChangePhase::Post => {
                let stashed = ctx.take_stash(entity);
                self.unique_sets_changed(unique.owner, staged, ctx, stashed)
            }
        }
    }

    fn validate_schema(&self, schema: &SchemaDefinition) -> Result<()> {
        if self.cache.registry().is_reserved_namespace(&schema.namespace) {
            return Err(MutantError::Configuration(format!(
                "namespace '{}' belongs to declared types",
                schema.namespace
            )));
        }
        Ok(())
    }

    fn validate_base(&self, base: &BaseDefinition, staged: &DefinitionData) -> Result<()> {
        let dynamic_key = match &base.kind {
            BaseKind::Model { type_key } => Some(type_key.clone()),
            BaseKind::Mixin { reference } => TypeKey::parse(reference),
        };
        if let Some(key) = dynamic_key
            && staged.find_schema(&key.namespace, &key.name).is_some()
        {
            return Err(MutantError::validation(
                "base",
                format!("cannot inherit from the synthesized type {}", key),
            ));
        }
        self.cache.registry().resolve_base(&base.kind)?;
        Ok(())
    }

    fn validate_field(&self, field: &FieldDefinition) -> Result<()> {
        if let Some(RelationTarget::Declared(key)) = field.kind.relation_target()
            && self.cache.registry().declared(key).is_none()
        {
            return Err(MutantError::Configuration(format!(
                "relation '{}' targets unknown type {}",
                field.name, key
            )));
        }
        Ok(())
    }

    /// Checks the lookup of an ordering against the staged field graph.
    ///
    /// A lookup names a field of the owner, optionally followed by exactly
    /// one field of the type a relation points at.
    fn validate_ordering(
        &self,
        ordering: &OrderingDefinition,
        staged: &DefinitionData,
    ) -> Result<()> {
        if ordering.lookup == RANDOM_ORDERING {
            return Ok(());
        }
        let invalid = |message: String| MutantError::validation("lookup", message);

        let steps = ordering.steps();
        if steps.iter().any(|step| step.is_empty()) {
            return Err(invalid(format!("malformed lookup '{}'", ordering.lookup)));
        }

        let fields = self.target_fields(&RelationTarget::Schema(ordering.owner), staged)?;
        let first = fields
            .iter()
            .find(|field| field.name == steps[0])
            .ok_or_else(|| invalid(format!("unknown field '{}'", steps[0])))?;

        match steps.len() {
            1 => Ok(()),
            2 => {
                let target = first.relation.as_ref().ok_or_else(|| {
                    invalid(format!("'{}' is not a relation", first.name))
                })?;
                let related = self.target_fields(target, staged)?;
                if related.iter().any(|field| field.name == steps[1]) {
                    Ok(())
                } else {
                    Err(invalid(format!(
                        "unknown field '{}' on the target of '{}'",
                        steps[1], first.name
                    )))
                }
            }
            _ => Err(invalid(format!(
                "'{}' follows more than one relation",
                ordering.lookup
            ))),
        }
    }

    fn target_fields(
        &self,
        target: &RelationTarget,
        staged: &DefinitionData,
    ) -> Result<Vec<FieldDescriptor>> {
        match target {
            RelationTarget::Schema(id) => {
                let snapshot = staged.build_snapshot(*id)?;
                let runtime = self
                    .cache
                    .synthesizer()
                    .synthesize(&snapshot, Bookkeeping::new())?;
                Ok(runtime.fields().to_vec())
            }
            RelationTarget::Declared(key) => {
                let declared = self.cache.registry().declared(key).ok_or_else(|| {
                    MutantError::Configuration(format!("unknown declared type {}", key))
                })?;
                let mut fields = declared.fields.clone();
                if !fields.iter().any(|field| field.primary_key) {
                    fields.insert(0, self.cache.synthesizer().implicit_key());
                }
                Ok(fields)
            }
        }
    }
}

impl LifecycleObserver for MigrationCoordinator {
    fn clean(&self, event: &LifecycleEvent, staged: &DefinitionData) -> Result<()> {
        match event {
            LifecycleEvent::SchemaSaved { schema, .. } => self.validate_schema(schema),
            LifecycleEvent::BaseSaved { base, .. } => self.validate_base(base, staged),
            LifecycleEvent::FieldSaved { field, .. } => self.validate_field(field),
            LifecycleEvent::OrderingSaved { ordering, .. } => {
                self.validate_ordering(ordering, staged)
            }
            _ => Ok(()),
        }
    }

    fn observe(
        &self,
        event: &LifecycleEvent,
        staged: &DefinitionData,
        ctx: &mut EventContext,
    ) -> Result<()> {
        let owner = event.owner();
        let span = info_span!("migration.coordinator", event = event.name(), owner = %owner);
        let _enter = span.enter();

        match event {
            LifecycleEvent::SchemaSaved {
                schema,
                previous,
                raw,
            } => {
                let schema = if *raw {
                    staged.schema(schema.id).unwrap_or(schema)
                } else {
                    schema
                };
                self.schema_saved(schema, previous.as_ref(), staged, ctx)
            }
            LifecycleEvent::SchemaDeleting { schema } => self.schema_deleting(schema, staged, ctx),
            LifecycleEvent::SchemaDeleted { schema } => self.schema_deleted(schema, ctx),
            _ if ctx.is_subsumed_by(owner) => {
                if let LifecycleEvent::FieldSaved { field, .. } = event {
                    ctx.take_initial_value(field.id);
                }
                self.subsumed(ctx, owner);
                Ok(())
            }
            LifecycleEvent::BaseSaved {
                base,
                previous,
                raw,
            } => {
                let base = if *raw {
                    staged.base(base.id).unwrap_or(base)
                } else {
                    base
                };
                self.base_changed(base, previous.as_ref(), false, staged, ctx)
            }
            LifecycleEvent::BaseDeleted { base } => {
                self.base_changed(base, Some(base), true, staged, ctx)
            }
            LifecycleEvent::FieldSaved {
                field,
                previous,
                raw,
            } => {
                let field = if *raw {
                    staged.field(field.id).unwrap_or(field)
                } else {
                    field
                };
                self.field_saved(field, previous.as_ref(), *raw, staged, ctx)
            }
            LifecycleEvent::FieldDeleted { field } => self.field_deleted(field, staged, ctx),
            LifecycleEvent::OrderingSaved { .. } | LifecycleEvent::OrderingDeleted { .. } => {
                self.regenerate(owner, staged, ctx, &|_, _, _| Ok(()))?;
                Ok(())
            }
            LifecycleEvent::UniqueTogetherSaved { .. }
            | LifecycleEvent::UniqueTogetherDeleted { .. } => {
                self.unique_sets_changed(owner, staged, ctx, None)
            }
            LifecycleEvent::UniqueMembersChanged { unique, phase, .. } => {
                self.unique_members_changed(unique, *phase, staged, ctx)
            }
        }
    }
}
