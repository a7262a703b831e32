//! Registry of statically declared types.
//!
//! Resolves base references and declared relation targets, reserves the
//! namespaces declared types live in, and caches `namespace.Name` lookups of
//! synthesized types.

pub mod declared;

pub use declared::DeclaredType;

use crate::core::{MutantError, Result, SchemaId, TypeKey};
use crate::definition::BaseKind;
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

pub struct TypeRegistry {
    declared: HashMap<TypeKey, Arc<DeclaredType>>,
    mixins: HashMap<String, Arc<DeclaredType>>,
    reserved_namespaces: HashSet<String>,
    names: Mutex<LruCache<TypeKey, SchemaId>>,
}

impl TypeRegistry {
    pub fn new(name_cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(name_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            declared: HashMap::new(),
            mixins: HashMap::new(),
            reserved_namespaces: HashSet::new(),
            names: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Register a declared type; its namespace becomes reserved.
    pub fn declare(&mut self, declared: DeclaredType) -> Result<()> {
        if self.declared.contains_key(&declared.key) {
            return Err(MutantError::Configuration(format!(
                "type '{}' is already declared",
                declared.key
            )));
        }
        self.reserved_namespaces
            .insert(declared.key.namespace.clone());
        self.declared
            .insert(declared.key.clone(), Arc::new(declared));
        Ok(())
    }

    /// Register a mixin under a reference path such as `core::Timestamped`.
    ///
    /// Mixins are plain or abstract types; a concrete declared type must be
    /// referenced as a model base instead.
    pub fn register_mixin(&mut self, reference: &str, declared: DeclaredType) -> Result<()> {
        if !declared.is_abstract {
            return Err(MutantError::Configuration(format!(
                "mixin '{}' must be abstract",
                reference
            )));
        }
        if self.mixins.contains_key(reference) {
            return Err(MutantError::Configuration(format!(
                "mixin '{}' is already registered",
                reference
            )));
        }
        self.mixins.insert(reference.to_string(), Arc::new(declared));
        Ok(())
    }

    pub fn reserve_namespace(&mut self, namespace: &str) {
        self.reserved_namespaces.insert(namespace.to_string());
    }

    pub fn is_reserved_namespace(&self, namespace: &str) -> bool {
        self.reserved_namespaces.contains(namespace)
    }

    pub fn declared(&self, key: &TypeKey) -> Option<Arc<DeclaredType>> {
        self.declared.get(key).cloned()
    }

    pub fn mixin(&self, reference: &str) -> Option<Arc<DeclaredType>> {
        self.mixins.get(reference).cloned()
    }

    /// Resolve the type a base definition points at.
    pub fn resolve_base(&self, kind: &BaseKind) -> Result<Arc<DeclaredType>> {
        match kind {
            BaseKind::Model { type_key } => self.declared(type_key).ok_or_else(|| {
                MutantError::Configuration(format!("unresolved base type '{}'", type_key))
            }),
            BaseKind::Mixin { reference } => self.mixin(reference).ok_or_else(|| {
                MutantError::Configuration(format!("unresolved mixin '{}'", reference))
            }),
        }
    }

    pub fn cached_name(&self, key: &TypeKey) -> Result<Option<SchemaId>> {
        Ok(self.names.lock()?.get(key).copied())
    }

    pub fn remember_name(&self, key: TypeKey, id: SchemaId) -> Result<()> {
        self.names.lock()?.put(key, id);
        Ok(())
    }

    pub fn invalidate(&self, key: &TypeKey) -> Result<()> {
        self.names.lock()?.pop(key);
        Ok(())
    }

    pub fn clear_name_cache(&self) -> Result<()> {
        self.names.lock()?.clear();
        Ok(())
    }
}
