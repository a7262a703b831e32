//! Transactional in-memory store of definitions.
//!
//! Every public mutation runs as one transaction: the committed data is
//! cloned, mutated, validated and passed through the registered lifecycle
//! observers event by event. The clone is published only if every observer
//! accepted every event; otherwise it is dropped and the rollback hooks
//! observers registered on the [`EventContext`] run.

pub mod context;
pub mod data;
pub mod event;
pub mod fixture;

pub use context::{EntityRef, EventContext, OperationOrigin};
pub use data::DefinitionData;
pub use event::{ChangePhase, LifecycleEvent, LifecycleObserver};
pub use fixture::Fixture;

use crate::core::{
    BaseId, FieldId, MutantError, OrderingId, Result, SchemaId, UniqueTogetherId,
};
use crate::definition::unique::normalize_members;
use crate::definition::{
    BaseDefinition, BaseDraft, DefinitionSnapshot, DefinitionSource, FieldDefinition, FieldDraft,
    MembershipAction, OrderingDefinition, OrderingDraft, SchemaDefinition, SchemaDraft,
    UniqueTogetherDefinition,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{Level, info_span};

pub struct DefinitionStore {
    committed: RwLock<Arc<DefinitionData>>,
    /// Serializes writers; readers only ever touch `committed` briefly.
    writer: Mutex<()>,
    observers: RwLock<Vec<Weak<dyn LifecycleObserver>>>,
    next_id: AtomicU64,
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Arc::new(DefinitionData::default())),
            writer: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an observer without keeping it alive.
    pub fn subscribe(&self, observer: Weak<dyn LifecycleObserver>) -> Result<()> {
        let mut observers = self.observers.write()?;
        observers.retain(|existing| existing.strong_count() > 0);
        observers.push(observer);
        Ok(())
    }

    /// The committed data.
    pub fn data(&self) -> Result<Arc<DefinitionData>> {
        Ok(self.committed.read()?.clone())
    }

    pub fn get_schema(&self, id: SchemaId) -> Result<SchemaDefinition> {
        self.data()?
            .schema(id)
            .cloned()
            .ok_or_else(|| MutantError::NotFound(format!("schema {}", id)))
    }

    pub fn find_schema(&self, namespace: &str, type_name: &str) -> Result<Option<SchemaDefinition>> {
        Ok(self.data()?.find_schema(namespace, type_name).cloned())
    }

    pub fn list(&self) -> Result<Vec<SchemaDefinition>> {
        Ok(self.data()?.schemas().cloned().collect())
    }

    pub fn field(&self, id: FieldId) -> Result<FieldDefinition> {
        self.data()?
            .field(id)
            .cloned()
            .ok_or_else(|| MutantError::NotFound(format!("field {}", id)))
    }

    /// Dump the committed definitions as raw rows.
    pub fn export(&self) -> Result<Fixture> {
        let data = self.data()?;
        let mut fixture = Fixture::default();
        for schema in data.schemas() {
            let snapshot = data.build_snapshot(schema.id)?;
            fixture.schemas.push(snapshot.schema);
            fixture.bases.extend(snapshot.bases);
            fixture.fields.extend(snapshot.fields);
            fixture.orderings.extend(snapshot.orderings);
            fixture.unique_together.extend(snapshot.unique_together);
        }
        Ok(fixture)
    }

    /// Create a schema together with the children listed in `draft`.
    pub fn create_schema(&self, draft: SchemaDraft) -> Result<SchemaId> {
        self.transaction("create_schema", |st, ctx| {
            let id = SchemaId(st.allocate());
            let schema = draft.to_definition(id);
            st.data.put_schema(schema.clone());

            ctx.within(OperationOrigin::OwnerCreation(id), |ctx| -> Result<()> {
                for base in &draft.bases {
                    st.add_base(ctx, id, base.clone())?;
                }
                let mut by_name = HashMap::new();
                for field in &draft.fields {
                    let field_id = st.add_field(ctx, id, field.clone())?;
                    by_name.insert(field.name.as_str(), field_id);
                }
                for ordering in &draft.orderings {
                    st.add_ordering(ctx, id, ordering.clone())?;
                }
                for names in &draft.unique_together {
                    let members = names
                        .iter()
                        .map(|name| {
                            by_name.get(name.as_str()).copied().ok_or_else(|| {
                                MutantError::validation(
                                    "unique_together",
                                    format!("unknown field '{}'", name),
                                )
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    st.add_unique(ctx, id, members)?;
                }
                Ok(())
            })?;

            st.save(
                ctx,
                LifecycleEvent::SchemaSaved {
                    schema,
                    previous: None,
                    raw: false,
                },
            )?;
            Ok(id)
        })
    }

    pub fn update_schema(
        &self,
        id: SchemaId,
        update: impl FnOnce(&mut SchemaDefinition),
    ) -> Result<()> {
        self.transaction("update_schema", |st, ctx| {
            let previous = st.schema(id)?;
            let mut schema = previous.clone();
            update(&mut schema);
            if schema.id != id {
                return Err(MutantError::validation("id", "the id of a schema is fixed"));
            }
            st.data.put_schema(schema.clone());
            st.save(
                ctx,
                LifecycleEvent::SchemaSaved {
                    schema,
                    previous: Some(previous),
                    raw: false,
                },
            )
        })
    }

    /// Delete a schema, its children, and relation fields elsewhere that
    /// point at it.
    pub fn delete_schema(&self, id: SchemaId) -> Result<()> {
        self.transaction("delete_schema", |st, ctx| st.delete_schema(ctx, id))
    }

    pub fn add_field(&self, owner: SchemaId, draft: FieldDraft) -> Result<FieldId> {
        self.transaction("add_field", |st, ctx| st.add_field(ctx, owner, draft))
    }

    pub fn update_field(
        &self,
        id: FieldId,
        update: impl FnOnce(&mut FieldDefinition),
    ) -> Result<()> {
        self.transaction("update_field", |st, ctx| {
            let previous = st.field(id)?;
            let mut field = previous.clone();
            update(&mut field);
            if field.id != id || field.owner != previous.owner {
                return Err(MutantError::validation(
                    "owner",
                    "a field cannot move to another schema",
                ));
            }
            st.data.put_field(field.clone());
            st.save(
                ctx,
                LifecycleEvent::FieldSaved {
                    field,
                    previous: Some(previous),
                    raw: false,
                },
            )
        })
    }

    pub fn delete_field(&self, id: FieldId) -> Result<()> {
        self.transaction("delete_field", |st, ctx| st.delete_field(ctx, id))
    }

    pub fn add_base(&self, owner: SchemaId, draft: BaseDraft) -> Result<BaseId> {
        self.transaction("add_base", |st, ctx| st.add_base(ctx, owner, draft))
    }

    pub fn update_base(&self, id: BaseId, update: impl FnOnce(&mut BaseDefinition)) -> Result<()> {
        self.transaction("update_base", |st, ctx| {
            let previous = st.base(id)?;
            let mut base = previous.clone();
            update(&mut base);
            if base.id != id || base.owner != previous.owner {
                return Err(MutantError::validation(
                    "owner",
                    "a base cannot move to another schema",
                ));
            }
            st.data.put_base(base.clone());
            st.save(
                ctx,
                LifecycleEvent::BaseSaved {
                    base,
                    previous: Some(previous),
                    raw: false,
                },
            )
        })
    }

    pub fn delete_base(&self, id: BaseId) -> Result<()> {
        self.transaction("delete_base", |st, ctx| st.delete_base(ctx, id))
    }

    pub fn add_ordering(&self, owner: SchemaId, draft: OrderingDraft) -> Result<OrderingId> {
        self.transaction("add_ordering", |st, ctx| st.add_ordering(ctx, owner, draft))
    }

    pub fn update_ordering(
        &self,
        id: OrderingId,
        update: impl FnOnce(&mut OrderingDefinition),
    ) -> Result<()> {
        self.transaction("update_ordering", |st, ctx| {
            let previous = st
                .data
                .ordering(id)
                .cloned()
                .ok_or_else(|| MutantError::NotFound(format!("ordering {}", id)))?;
            let mut ordering = previous.clone();
            update(&mut ordering);
            if ordering.id != id || ordering.owner != previous.owner {
                return Err(MutantError::validation(
                    "owner",
                    "an ordering cannot move to another schema",
                ));
            }
            st.data.put_ordering(ordering.clone());
            st.save(
                ctx,
                LifecycleEvent::OrderingSaved {
                    ordering,
                    previous: Some(previous),
                    raw: false,
                },
            )
        })
    }

    pub fn delete_ordering(&self, id: OrderingId) -> Result<()> {
        self.transaction("delete_ordering", |st, ctx| st.delete_ordering(ctx, id))
    }

    pub fn add_unique_together(
        &self,
        owner: SchemaId,
        members: &[FieldId],
    ) -> Result<UniqueTogetherId> {
        self.transaction("add_unique_together", |st, ctx| {
            st.add_unique(ctx, owner, members.to_vec())
        })
    }

    /// Replace the members in one change.
    pub fn set_unique_members(&self, id: UniqueTogetherId, members: &[FieldId]) -> Result<()> {
        self.transaction("set_unique_members", |st, ctx| {
            st.change_members(ctx, id, MembershipAction::Set, members)
        })
    }

    pub fn add_unique_members(&self, id: UniqueTogetherId, members: &[FieldId]) -> Result<()> {
        self.transaction("add_unique_members", |st, ctx| {
            st.change_members(ctx, id, MembershipAction::Add, members)
        })
    }

    pub fn remove_unique_members(&self, id: UniqueTogetherId, members: &[FieldId]) -> Result<()> {
        self.transaction("remove_unique_members", |st, ctx| {
            st.change_members(ctx, id, MembershipAction::Remove, members)
        })
    }

    pub fn clear_unique_members(&self, id: UniqueTogetherId) -> Result<()> {
        self.transaction("clear_unique_members", |st, ctx| {
            st.change_members(ctx, id, MembershipAction::Clear, &[])
        })
    }

    pub fn delete_unique_together(&self, id: UniqueTogetherId) -> Result<()> {
        self.transaction("delete_unique_together", |st, ctx| st.delete_unique(ctx, id))
    }

    /// Load raw rows. Existing ids are updated, new ones created; every
    /// event is flagged `raw`.
    pub fn load_fixture(&self, fixture: &Fixture) -> Result<()> {
        self.transaction("load_fixture", |st, ctx| {
            for schema in &fixture.schemas {
                let previous = st.data.put_schema(schema.clone());
                st.save(
                    ctx,
                    LifecycleEvent::SchemaSaved {
                        schema: schema.clone(),
                        previous,
                        raw: true,
                    },
                )?;
            }
            for base in &fixture.bases {
                let previous = st.data.put_base(base.clone());
                st.save(
                    ctx,
                    LifecycleEvent::BaseSaved {
                        base: base.clone(),
                        previous,
                        raw: true,
                    },
                )?;
            }
            for field in &fixture.fields {
                let previous = st.data.put_field(field.clone());
                st.save(
                    ctx,
                    LifecycleEvent::FieldSaved {
                        field: field.clone(),
                        previous,
                        raw: true,
                    },
                )?;
            }
            for ordering in &fixture.orderings {
                let previous = st.data.put_ordering(ordering.clone());
                st.save(
                    ctx,
                    LifecycleEvent::OrderingSaved {
                        ordering: ordering.clone(),
                        previous,
                        raw: true,
                    },
                )?;
            }
            for unique in &fixture.unique_together {
                let unique =
                    UniqueTogetherDefinition::new(unique.id, unique.owner, unique.members.clone());
                let previous = st.data.put_unique(unique.clone());
                st.save(
                    ctx,
                    LifecycleEvent::UniqueTogetherSaved {
                        unique,
                        previous,
                        raw: true,
                    },
                )?;
            }
            st.ids.fetch_max(st.data.max_id() + 1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn transaction<T>(
        &self,
        operation: &'static str,
        work: impl FnOnce(&mut Staging<'_>, &mut EventContext) -> Result<T>,
    ) -> Result<T> {
        let _writer = self.writer.lock()?;
        let span = info_span!("definition.store", operation = operation);
        let _enter = span.enter();

        let mut staging = Staging {
            data: (**self.committed.read()?).clone(),
            observers: self.live_observers()?,
            ids: &self.next_id,
        };
        let mut ctx = EventContext::new();

        let outcome = work(&mut staging, &mut ctx).and_then(|value| {
            staging.data.validate()?;
            Ok(value)
        });
        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                ctx.rolled_back();
                tracing::event!(Level::WARN, error = %err, "definition transaction rolled back");
                return Err(err);
            }
        };

        match self.committed.write() {
            Ok(mut committed) => *committed = Arc::new(staging.data),
            Err(err) => {
                ctx.rolled_back();
                return Err(err.into());
            }
        }
        ctx.committed();
        tracing::event!(Level::DEBUG, "definition transaction committed");
        Ok(value)
    }

    fn live_observers(&self) -> Result<Vec<Arc<dyn LifecycleObserver>>> {
        Ok(self
            .observers
            .read()?
            .iter()
            .filter_map(Weak::upgrade)
            .collect())
    }
}

impl DefinitionSource for DefinitionStore {
    fn snapshot(&self, id: SchemaId) -> Result<DefinitionSnapshot> {
        self.data()?.build_snapshot(id)
    }
}

/// The private copy a transaction works on.
struct Staging<'a> {
    data: DefinitionData,
    observers: Vec<Arc<dyn LifecycleObserver>>,
    ids: &'a AtomicU64,
}

impl Staging<'_> {
    fn allocate(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::SeqCst)
    }

    /// Validate the staged graph, then notify observers.
    fn save(&self, ctx: &mut EventContext, event: LifecycleEvent) -> Result<()> {
        self.data.validate()?;
        self.emit(ctx, event)
    }

    fn emit(&self, ctx: &mut EventContext, event: LifecycleEvent) -> Result<()> {
        tracing::event!(Level::DEBUG, event = %event, "lifecycle event");
        for observer in &self.observers {
            observer.clean(&event, &self.data)?;
        }
        for observer in &self.observers {
            observer.observe(&event, &self.data, ctx)?;
        }
        Ok(())
    }

    fn schema(&self, id: SchemaId) -> Result<SchemaDefinition> {
        self.data
            .schema(id)
            .cloned()
            .ok_or_else(|| MutantError::NotFound(format!("schema {}", id)))
    }

    fn field(&self, id: FieldId) -> Result<FieldDefinition> {
        self.data
            .field(id)
            .cloned()
            .ok_or_else(|| MutantError::NotFound(format!("field {}", id)))
    }

    fn base(&self, id: BaseId) -> Result<BaseDefinition> {
        self.data
            .base(id)
            .cloned()
            .ok_or_else(|| MutantError::NotFound(format!("base {}", id)))
    }

    fn add_field(
        &mut self,
        ctx: &mut EventContext,
        owner: SchemaId,
        draft: FieldDraft,
    ) -> Result<FieldId> {
        self.schema(owner)?;
        let id = FieldId(self.allocate());
        let field = draft.to_definition(id, owner);
        if let Some(value) = draft.initial_value {
            ctx.set_initial_value(id, value);
        }
        self.data.put_field(field.clone());
        self.save(
            ctx,
            LifecycleEvent::FieldSaved {
                field,
                previous: None,
                raw: false,
            },
        )?;
        Ok(id)
    }

    /// Leaves unique-together memberships first, then goes.
    fn delete_field(&mut self, ctx: &mut EventContext, id: FieldId) -> Result<()> {
        let field = self.field(id)?;
        let memberships: Vec<UniqueTogetherId> = self
            .data
            .uniques_containing(id)
            .into_iter()
            .map(|unique| unique.id)
            .collect();
        for unique in memberships {
            self.change_members(ctx, unique, MembershipAction::Remove, &[id])?;
        }
        self.data.remove_field(id);
        self.emit(ctx, LifecycleEvent::FieldDeleted { field })
    }

    fn add_base(
        &mut self,
        ctx: &mut EventContext,
        owner: SchemaId,
        draft: BaseDraft,
    ) -> Result<BaseId> {
        self.schema(owner)?;
        let id = BaseId(self.allocate());
        let base = BaseDefinition {
            id,
            owner,
            order: draft
                .order
                .unwrap_or_else(|| self.data.next_base_order(owner)),
            kind: draft.kind,
        };
        self.data.put_base(base.clone());
        self.save(
            ctx,
            LifecycleEvent::BaseSaved {
                base,
                previous: None,
                raw: false,
            },
        )?;
        Ok(id)
    }

    fn delete_base(&mut self, ctx: &mut EventContext, id: BaseId) -> Result<()> {
        let base = self.base(id)?;
        self.data.remove_base(id);
        self.emit(ctx, LifecycleEvent::BaseDeleted { base })
    }

    fn add_ordering(
        &mut self,
        ctx: &mut EventContext,
        owner: SchemaId,
        draft: OrderingDraft,
    ) -> Result<OrderingId> {
        self.schema(owner)?;
        let id = OrderingId(self.allocate());
        let ordering = OrderingDefinition {
            id,
            owner,
            order: draft
                .order
                .unwrap_or_else(|| self.data.next_ordering_order(owner)),
            lookup: draft.lookup,
            descending: draft.descending,
        };
        self.data.put_ordering(ordering.clone());
        self.save(
            ctx,
            LifecycleEvent::OrderingSaved {
                ordering,
                previous: None,
                raw: false,
            },
        )?;
        Ok(id)
    }

    fn delete_ordering(&mut self, ctx: &mut EventContext, id: OrderingId) -> Result<()> {
        let ordering = self
            .data
            .remove_ordering(id)
            .ok_or_else(|| MutantError::NotFound(format!("ordering {}", id)))?;
        self.emit(ctx, LifecycleEvent::OrderingDeleted { ordering })
    }

    fn add_unique(
        &mut self,
        ctx: &mut EventContext,
        owner: SchemaId,
        members: Vec<FieldId>,
    ) -> Result<UniqueTogetherId> {
        self.schema(owner)?;
        let id = UniqueTogetherId(self.allocate());
        let unique = UniqueTogetherDefinition::new(id, owner, members);
        self.data.put_unique(unique.clone());
        self.save(
            ctx,
            LifecycleEvent::UniqueTogetherSaved {
                unique,
                previous: None,
                raw: false,
            },
        )?;
        Ok(id)
    }

    fn delete_unique(&mut self, ctx: &mut EventContext, id: UniqueTogetherId) -> Result<()> {
        let unique = self
            .data
            .remove_unique(id)
            .ok_or_else(|| MutantError::NotFound(format!("unique together {}", id)))?;
        self.emit(ctx, LifecycleEvent::UniqueTogetherDeleted { unique })
    }

    /// Emits a pre/post pair around the membership change; a change that
    /// leaves the member set as it was emits nothing.
    fn change_members(
        &mut self,
        ctx: &mut EventContext,
        id: UniqueTogetherId,
        action: MembershipAction,
        fields: &[FieldId],
    ) -> Result<()> {
        let unique = self
            .data
            .unique(id)
            .cloned()
            .ok_or_else(|| MutantError::NotFound(format!("unique together {}", id)))?;
        let previous = unique.members.clone();
        let members = match action {
            MembershipAction::Add => previous.iter().chain(fields).copied().collect(),
            MembershipAction::Remove => previous
                .iter()
                .copied()
                .filter(|member| !fields.contains(member))
                .collect(),
            MembershipAction::Clear => Vec::new(),
            MembershipAction::Set => fields.to_vec(),
        };
        let members = normalize_members(members);
        if members == previous {
            return Ok(());
        }

        self.emit(
            ctx,
            LifecycleEvent::UniqueMembersChanged {
                unique: unique.clone(),
                previous: previous.clone(),
                action,
                phase: ChangePhase::Pre,
            },
        )?;

        let updated = UniqueTogetherDefinition { members, ..unique };
        self.data.put_unique(updated.clone());
        self.save(
            ctx,
            LifecycleEvent::UniqueMembersChanged {
                unique: updated,
                previous,
                action,
                phase: ChangePhase::Post,
            },
        )
    }

    /// Children of `id` go inside the cascade scope so their handlers can
    /// tell their DDL is covered by the drop-table.
    fn delete_schema(&mut self, ctx: &mut EventContext, id: SchemaId) -> Result<()> {
        let schema = self.schema(id)?;
        self.emit(
            ctx,
            LifecycleEvent::SchemaDeleting {
                schema: schema.clone(),
            },
        )?;

        ctx.within_cascade(id, |ctx| -> Result<()> {
            let referencing: Vec<FieldId> = self
                .data
                .fields_targeting(id)
                .into_iter()
                .map(|field| field.id)
                .collect();
            for field in referencing {
                self.delete_field(ctx, field)?;
            }

            let uniques: Vec<_> = self.data.uniques_of(id).iter().map(|u| u.id).collect();
            for unique in uniques {
                self.delete_unique(ctx, unique)?;
            }
            let orderings: Vec<_> = self.data.orderings_of(id).iter().map(|o| o.id).collect();
            for ordering in orderings {
                self.delete_ordering(ctx, ordering)?;
            }
            let fields: Vec<_> = self.data.fields_of(id).iter().map(|f| f.id).collect();
            for field in fields {
                self.delete_field(ctx, field)?;
            }
            let bases: Vec<_> = self.data.bases_of(id).iter().map(|b| b.id).collect();
            for base in bases {
                self.delete_base(ctx, base)?;
            }
            Ok(())
        })?;

        self.data.remove_schema(id);
        self.emit(ctx, LifecycleEvent::SchemaDeleted { schema })
    }
}
