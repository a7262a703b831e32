// ============================================================================
// RustMutant Library
// ============================================================================
//
// Record types defined at runtime from stored definitions, with the backing
// storage schema kept in step with every definition change.

pub mod core;
pub mod config;
pub mod definition;
pub mod registry;
pub mod synth;
pub mod cache;
pub mod proxy;
pub mod store;
pub mod migration;
pub mod facade;

// Re-export main types for convenience
pub use facade::{DEFAULT_ALIAS, ResolvedType, SchemaEngine, SchemaEngineBuilder};
pub use core::{
    BaseId, DataType, FieldId, MutantError, OrderingId, Result, SchemaId, TypeKey,
    UniqueTogetherId, Value,
};
pub use config::EngineConfig;
pub use definition::{
    BaseDraft, BaseKind, FieldDraft, FieldKind, OrderingDraft, RelationTarget, SchemaDraft,
    TemporalOptions,
};
pub use registry::{DeclaredType, TypeRegistry};
pub use synth::{FieldDescriptor, FieldOrigin, RuntimeType};
pub use proxy::{ModelHandle, Record};
pub use store::{DefinitionStore, Fixture};

// Re-export migration API
pub use migration::{
    AllowAll, DatabaseRouter, MemoryDatabase, MigrationBackend, NamespaceRouter, SchemaEditor,
    SchemaOperation,
};
