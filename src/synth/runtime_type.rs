use crate::cache::{Bookkeeping, TypeSubscriber};
use crate::core::{BaseId, DataType, FieldId, SchemaId, TypeKey, Value};
use crate::definition::{RelationTarget, TemporalOptions};
use crate::registry::DeclaredType;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where a materialized field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrigin {
    /// The auto-assigned primary key.
    Implicit,
    /// Declared on a statically declared type.
    Declared,
    /// Contributed by a base definition.
    Base(BaseId),
    /// A field definition of the owner.
    Definition(FieldId),
}

/// A materialized storage field of a runtime type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub primary_key: bool,
    pub unique: bool,
    pub auto_increment: bool,
    pub max_length: Option<u32>,
    pub temporal: TemporalOptions,
    pub relation: Option<RelationTarget>,
    pub parent_link: bool,
    pub origin: FieldOrigin,
}

impl FieldDescriptor {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            column: name.to_string(),
            data_type,
            nullable: false,
            default: None,
            primary_key: false,
            unique: false,
            auto_increment: false,
            max_length: None,
            temporal: TemporalOptions::default(),
            relation: None,
            parent_link: false,
            origin: FieldOrigin::Declared,
        }
    }

    /// The auto-incrementing key assigned when nothing else is primary.
    pub fn implicit_key(name: &str) -> Self {
        Self {
            primary_key: true,
            auto_increment: true,
            unique: true,
            origin: FieldOrigin::Implicit,
            ..Self::new(name, DataType::Integer)
        }
    }

    /// Relation field pointing at a declared type.
    pub fn relation(name: &str, target: TypeKey) -> Self {
        Self {
            column: format!("{}_id", name),
            relation: Some(RelationTarget::Declared(target)),
            ..Self::new(name, DataType::Integer)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_implicit_key(&self) -> bool {
        self.origin == FieldOrigin::Implicit
    }
}

/// A resolved base of a runtime type, in precedence order.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseType {
    Declared(Arc<DeclaredType>),
    /// Always last; tags the type as synthesized.
    DynamicMarker,
}

impl BaseType {
    pub fn declared(&self) -> Option<&Arc<DeclaredType>> {
        match self {
            Self::Declared(declared) => Some(declared),
            Self::DynamicMarker => None,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared(declared) => write!(f, "{}", declared.key),
            Self::DynamicMarker => write!(f, "<dynamic>"),
        }
    }
}

/// Type-level options of a runtime type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeOptions {
    pub table_name: String,
    pub verbose_name: String,
    pub verbose_name_plural: String,
    /// `None` when the definition declares no ordering, so bases can supply one.
    pub ordering: Option<Vec<String>>,
    pub unique_together: Vec<Vec<String>>,
    pub externally_managed: bool,
}

/// The synthesized type of one schema definition.
///
/// Owned by the type cache. Any handle to it may become stale once the cache
/// synthesizes a replacement; the obsolete flag only ever goes from unset to
/// set.
pub struct RuntimeType {
    pub(crate) identity: SchemaId,
    pub(crate) key: TypeKey,
    pub(crate) bases: Vec<BaseType>,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) options: TypeOptions,
    pub(crate) dependencies: Vec<SchemaId>,
    pub(crate) generation: u64,
    pub(crate) obsolete: AtomicBool,
    pub(crate) bookkeeping: Arc<Bookkeeping>,
}

impl RuntimeType {
    pub fn identity(&self) -> SchemaId {
        self.identity
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn bases(&self) -> &[BaseType] {
        &self.bases
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.primary_key)
    }

    pub fn has_implicit_primary_key(&self) -> bool {
        self.primary_key().is_some_and(FieldDescriptor::is_implicit_key)
    }

    pub fn options(&self) -> &TypeOptions {
        &self.options
    }

    pub fn table_name(&self) -> &str {
        &self.options.table_name
    }

    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.column.as_str()).collect()
    }

    /// Other synthesized types this one holds relations to.
    pub fn dependencies(&self) -> &[SchemaId] {
        &self.dependencies
    }

    /// Position in the sequence of types synthesized for this definition.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub(crate) fn bookkeeping(&self) -> &Arc<Bookkeeping> {
        &self.bookkeeping
    }

    /// The type's own ordering, else that of the first base declaring one.
    pub fn effective_ordering(&self) -> Vec<String> {
        if let Some(ordering) = &self.options.ordering {
            return ordering.clone();
        }
        self.bases
            .iter()
            .filter_map(BaseType::declared)
            .find(|declared| !declared.ordering.is_empty())
            .map(|declared| declared.ordering.clone())
            .unwrap_or_default()
    }
}

impl TypeSubscriber for RuntimeType {
    fn dependency_regenerated(&self, dependency: SchemaId) {
        if self.dependencies.contains(&dependency) {
            self.mark_obsolete();
        }
    }
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("identity", &self.identity)
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("obsolete", &self.is_obsolete())
            .field("columns", &self.columns())
            .finish()
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}
