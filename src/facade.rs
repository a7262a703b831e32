use crate::cache::TypeCache;
use crate::config::EngineConfig;
use crate::core::{MutantError, Result, SchemaId, TypeKey};
use crate::migration::{
    AllowAll, ConnectionRegistry, DatabaseRouter, MemoryDatabase, MigrationBackend,
    MigrationCoordinator,
};
use crate::proxy::ModelHandle;
use crate::registry::{DeclaredType, TypeRegistry};
use crate::store::{DefinitionStore, LifecycleObserver};
use std::sync::{Arc, Weak};
use tracing::{Level, event};

/// Alias the in-memory constructors register their backend under.
pub const DEFAULT_ALIAS: &str = "default";

/// What a `namespace.Name` key refers to.
#[derive(Debug, Clone)]
pub enum ResolvedType {
    Declared(Arc<DeclaredType>),
    Dynamic(ModelHandle),
}

/// Entry point tying the definition store, the type cache and the migration
/// coordinator together.
///
/// ```
/// use rustmutant::{FieldDraft, FieldKind, SchemaDraft, SchemaEngine};
///
/// let (engine, database) = SchemaEngine::in_memory().unwrap();
/// let id = engine
///     .store()
///     .create_schema(SchemaDraft::new("shop", "Item").field(FieldDraft::new("name", FieldKind::text())))
///     .unwrap();
///
/// let item = engine.handle(id).unwrap();
/// assert_eq!(item.table_name().unwrap(), "mutant_shop_item");
/// assert!(database.has_table("mutant_shop_item").unwrap());
/// ```
pub struct SchemaEngine {
    store: Arc<DefinitionStore>,
    cache: Arc<TypeCache>,
    coordinator: Arc<MigrationCoordinator>,
}

impl SchemaEngine {
    pub fn builder() -> SchemaEngineBuilder {
        SchemaEngineBuilder::new()
    }

    /// An engine migrating onto a fresh [`MemoryDatabase`].
    pub fn in_memory() -> Result<(Self, Arc<MemoryDatabase>)> {
        Self::in_memory_with(EngineConfig::default())
    }

    pub fn in_memory_with(config: EngineConfig) -> Result<(Self, Arc<MemoryDatabase>)> {
        let database = Arc::new(MemoryDatabase::new());
        let engine = Self::builder()
            .config(config)
            .connection(DEFAULT_ALIAS, database.clone())
            .build()?;
        Ok((engine, database))
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TypeCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.cache.registry()
    }

    pub fn config(&self) -> &EngineConfig {
        self.cache.config()
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        self.coordinator.connections()
    }

    pub fn handle(&self, id: SchemaId) -> Result<ModelHandle> {
        ModelHandle::new(self.cache.clone(), id)
    }

    /// Handle of the dynamic type named `namespace.type_name`.
    pub fn handle_for(&self, namespace: &str, type_name: &str) -> Result<ModelHandle> {
        let key = TypeKey::new(namespace, type_name);
        let registry = self.cache.registry();
        if let Some(id) = registry.cached_name(&key)? {
            return self.handle(id);
        }

        let schema = self
            .store
            .find_schema(namespace, type_name)?
            .ok_or_else(|| MutantError::NotFound(format!("type {}", key)))?;
        registry.remember_name(key, schema.id)?;
        self.handle(schema.id)
    }

    /// Look `key` up among declared types first, then among definitions.
    pub fn resolve(&self, key: &TypeKey) -> Result<ResolvedType> {
        if let Some(declared) = self.cache.registry().declared(key) {
            return Ok(ResolvedType::Declared(declared));
        }
        self.handle_for(&key.namespace, &key.name)
            .map(ResolvedType::Dynamic)
    }

    /// Release every cached type. Outstanding handles re-resolve on next use.
    pub fn shutdown(&self) -> Result<()> {
        self.cache.clear()?;
        self.cache.registry().clear_name_cache()?;
        event!(Level::INFO, "schema engine shut down");
        Ok(())
    }
}

/// Builder for [`SchemaEngine`].
pub struct SchemaEngineBuilder {
    config: EngineConfig,
    declared: Vec<DeclaredType>,
    mixins: Vec<(String, DeclaredType)>,
    reserved: Vec<String>,
    connections: Vec<(String, Arc<dyn MigrationBackend>)>,
    router: Arc<dyn DatabaseRouter>,
}

impl Default for SchemaEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            declared: Vec::new(),
            mixins: Vec::new(),
            reserved: Vec::new(),
            connections: Vec::new(),
            router: Arc::new(AllowAll),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Make a statically declared type available as base or relation target.
    pub fn declare(mut self, declared: DeclaredType) -> Self {
        self.declared.push(declared);
        self
    }

    /// Register an abstract type under a free-form mixin reference.
    pub fn mixin(mut self, reference: &str, declared: DeclaredType) -> Self {
        self.mixins.push((reference.to_string(), declared));
        self
    }

    /// Forbid definitions inside `namespace`.
    pub fn reserve_namespace(mut self, namespace: &str) -> Self {
        self.reserved.push(namespace.to_string());
        self
    }

    pub fn connection(mut self, alias: &str, backend: Arc<dyn MigrationBackend>) -> Self {
        self.connections.push((alias.to_string(), backend));
        self
    }

    pub fn router(mut self, router: impl DatabaseRouter + 'static) -> Self {
        self.router = Arc::new(router);
        self
    }

    pub fn build(self) -> Result<SchemaEngine> {
        let mut registry = TypeRegistry::new(self.config.name_cache_capacity);
        for declared in self.declared {
            registry.declare(declared)?;
        }
        for (reference, declared) in self.mixins {
            registry.register_mixin(&reference, declared)?;
        }
        for namespace in &self.reserved {
            registry.reserve_namespace(namespace);
        }

        let mut connections = ConnectionRegistry::new();
        for (alias, backend) in self.connections {
            connections.register(&alias, backend)?;
        }
        if connections.is_empty() {
            event!(Level::WARN, "schema engine built without connections, DDL goes nowhere");
        }

        let store = Arc::new(DefinitionStore::new());
        let cache = Arc::new(TypeCache::new(
            Arc::new(registry),
            self.config,
            store.clone(),
        ));
        let coordinator = Arc::new(MigrationCoordinator::new(
            cache.clone(),
            connections,
            self.router,
        ));
        let observer: Arc<dyn LifecycleObserver> = coordinator.clone();
        let observer: Weak<dyn LifecycleObserver> = Arc::downgrade(&observer);
        store.subscribe(observer)?;

        Ok(SchemaEngine {
            store,
            cache,
            coordinator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::definition::{FieldDraft, FieldKind, SchemaDraft};
    use crate::synth::FieldDescriptor;

    #[test]
    fn test_handle_for_uses_name_cache() {
        let (engine, _) = SchemaEngine::in_memory().unwrap();
        let id = engine
            .store()
            .create_schema(SchemaDraft::new("shop", "Item"))
            .unwrap();

        let handle = engine.handle_for("shop", "Item").unwrap();
        assert_eq!(handle.identity(), id);
        assert_eq!(
            engine
                .registry()
                .cached_name(&TypeKey::new("shop", "Item"))
                .unwrap(),
            Some(id)
        );
        assert!(engine.handle_for("shop", "Missing").is_err());
    }

    #[test]
    fn test_resolve_prefers_declared_types() {
        let engine = SchemaEngine::builder()
            .declare(
                DeclaredType::new(TypeKey::new("auth", "User"))
                    .field(FieldDescriptor::new("email", DataType::Text)),
            )
            .build()
            .unwrap();

        match engine.resolve(&TypeKey::new("auth", "User")).unwrap() {
            ResolvedType::Declared(declared) => assert_eq!(declared.fields.len(), 1),
            ResolvedType::Dynamic(_) => panic!("expected the declared type"),
        }
    }

    #[test]
    fn test_duplicate_connection_alias() {
        let result = SchemaEngine::builder()
            .connection("default", Arc::new(MemoryDatabase::new()))
            .connection("default", Arc::new(MemoryDatabase::new()))
            .build();
        assert!(matches!(result, Err(MutantError::Configuration(_))));
    }

    #[test]
    fn test_shutdown_obsoletes_handles() {
        let (engine, _) = SchemaEngine::in_memory().unwrap();
        let id = engine
            .store()
            .create_schema(
                SchemaDraft::new("shop", "Item").field(FieldDraft::new("name", FieldKind::text())),
            )
            .unwrap();
        let handle = engine.handle(id).unwrap();
        let before = handle.resolve().unwrap();

        engine.shutdown().unwrap();
        assert!(before.is_obsolete());
        assert!(engine.cache().is_empty().unwrap());

        let after = handle.resolve().unwrap();
        assert!(!after.is_obsolete());
        assert!(after.field("name").is_some());
    }
}
