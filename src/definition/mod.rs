//! Persisted definitions describing the shape of synthesized types.
//!
//! Every entity here is plain data. Graph-level checks (name uniqueness,
//! ownership of unique-together members, primary key count) live with the
//! definition store because they need the whole staged graph.

pub mod base;
pub mod field;
pub mod ordering;
pub mod schema;
pub mod snapshot;
pub mod unique;
pub mod validate;

pub use base::{BaseDefinition, BaseDraft, BaseKind};
pub use field::{FieldDefinition, FieldDraft, FieldKind, RelationTarget, TemporalOptions};
pub use ordering::{LOOKUP_SEP, OrderingDefinition, OrderingDraft, RANDOM_ORDERING, split_lookup};
pub use schema::{SchemaDefinition, SchemaDraft};
pub use snapshot::{DefinitionSnapshot, DefinitionSource};
pub use unique::{MembershipAction, UniqueTogetherDefinition};
