use super::{DefinitionData, EventContext};
use crate::core::{FieldId, Result, SchemaId};
use crate::definition::{
    BaseDefinition, FieldDefinition, MembershipAction, OrderingDefinition, SchemaDefinition,
    UniqueTogetherDefinition,
};
use std::fmt;

/// Which side of a membership change an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangePhase {
    Pre,
    Post,
}

/// Lifecycle notification emitted by the definition store.
///
/// `Saved` events carry the pre-update row in `previous` (absent on
/// creation). `raw` marks rows loaded from a fixture; handlers must read such
/// rows back from the staged data and never rely on transient creation state.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    SchemaSaved {
        schema: SchemaDefinition,
        previous: Option<SchemaDefinition>,
        raw: bool,
    },
    /// Emitted before a schema and its children are removed.
    SchemaDeleting { schema: SchemaDefinition },
    SchemaDeleted { schema: SchemaDefinition },
    BaseSaved {
        base: BaseDefinition,
        previous: Option<BaseDefinition>,
        raw: bool,
    },
    BaseDeleted { base: BaseDefinition },
    FieldSaved {
        field: FieldDefinition,
        previous: Option<FieldDefinition>,
        raw: bool,
    },
    FieldDeleted { field: FieldDefinition },
    OrderingSaved {
        ordering: OrderingDefinition,
        previous: Option<OrderingDefinition>,
        raw: bool,
    },
    OrderingDeleted { ordering: OrderingDefinition },
    UniqueTogetherSaved {
        unique: UniqueTogetherDefinition,
        previous: Option<UniqueTogetherDefinition>,
        raw: bool,
    },
    UniqueTogetherDeleted { unique: UniqueTogetherDefinition },
    /// Membership of a unique-together definition changes; `Pre` is emitted
    /// before the staged data is touched, `Post` after.
    UniqueMembersChanged {
        unique: UniqueTogetherDefinition,
        previous: Vec<FieldId>,
        action: MembershipAction,
        phase: ChangePhase,
    },
}

impl LifecycleEvent {
    /// The schema whose synthesized type the event affects.
    pub fn owner(&self) -> SchemaId {
        match self {
            Self::SchemaSaved { schema, .. }
            | Self::SchemaDeleting { schema }
            | Self::SchemaDeleted { schema } => schema.id,
            Self::BaseSaved { base, .. } | Self::BaseDeleted { base } => base.owner,
            Self::FieldSaved { field, .. } | Self::FieldDeleted { field } => field.owner,
            Self::OrderingSaved { ordering, .. } | Self::OrderingDeleted { ordering } => {
                ordering.owner
            }
            Self::UniqueTogetherSaved { unique, .. }
            | Self::UniqueTogetherDeleted { unique }
            | Self::UniqueMembersChanged { unique, .. } => unique.owner,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SchemaSaved { .. } => "schema_saved",
            Self::SchemaDeleting { .. } => "schema_deleting",
            Self::SchemaDeleted { .. } => "schema_deleted",
            Self::BaseSaved { .. } => "base_saved",
            Self::BaseDeleted { .. } => "base_deleted",
            Self::FieldSaved { .. } => "field_saved",
            Self::FieldDeleted { .. } => "field_deleted",
            Self::OrderingSaved { .. } => "ordering_saved",
            Self::OrderingDeleted { .. } => "ordering_deleted",
            Self::UniqueTogetherSaved { .. } => "unique_together_saved",
            Self::UniqueTogetherDeleted { .. } => "unique_together_deleted",
            Self::UniqueMembersChanged { .. } => "unique_members_changed",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.owner())
    }
}

/// Receives lifecycle events of every store transaction.
///
/// `clean` runs before `observe` and may only reject; `observe` may apply
/// side effects and register commit or rollback hooks on the context. An
/// error from either aborts the transaction.
pub trait LifecycleObserver: Send + Sync {
    fn clean(&self, _event: &LifecycleEvent, _staged: &DefinitionData) -> Result<()> {
        Ok(())
    }

    fn observe(
        &self,
        event: &LifecycleEvent,
        staged: &DefinitionData,
        ctx: &mut EventContext,
    ) -> Result<()>;
}
