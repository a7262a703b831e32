use super::MigrationBackend;
use crate::core::{MutantError, Result};
use crate::synth::RuntimeType;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Decides which connections a synthesized type is migrated on.
pub trait DatabaseRouter: Send + Sync {
    fn allow_migrate(&self, _alias: &str, _runtime: &RuntimeType) -> bool {
        true
    }
}

/// Routes every type to every connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl DatabaseRouter for AllowAll {}

/// Routes types of one namespace to one connection and everything else to
/// the default.
#[derive(Debug, Clone)]
pub struct NamespaceRouter {
    routes: BTreeMap<String, String>,
    default_alias: String,
}

impl NamespaceRouter {
    pub fn new(default_alias: &str) -> Self {
        Self {
            routes: BTreeMap::new(),
            default_alias: default_alias.to_string(),
        }
    }

    pub fn route(mut self, namespace: &str, alias: &str) -> Self {
        self.routes.insert(namespace.to_string(), alias.to_string());
        self
    }
}

impl DatabaseRouter for NamespaceRouter {
    fn allow_migrate(&self, alias: &str, runtime: &RuntimeType) -> bool {
        let target = self
            .routes
            .get(&runtime.key().namespace)
            .unwrap_or(&self.default_alias);
        target == alias
    }
}

/// Named migration backends.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<String, Arc<dyn MigrationBackend>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, alias: &str, backend: Arc<dyn MigrationBackend>) -> Result<()> {
        if self.connections.contains_key(alias) {
            return Err(MutantError::Configuration(format!(
                "connection '{}' is already registered",
                alias
            )));
        }
        self.connections.insert(alias.to_string(), backend);
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Option<Arc<dyn MigrationBackend>> {
        self.connections.get(alias).cloned()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// Connections `router` allows `runtime` on, in alias order.
    pub fn routed<'a>(
        &'a self,
        router: &'a dyn DatabaseRouter,
        runtime: &'a RuntimeType,
    ) -> impl Iterator<Item = (&'a str, &'a Arc<dyn MigrationBackend>)> + 'a {
        self.connections
            .iter()
            .filter(move |(alias, _)| router.allow_migrate(alias, runtime))
            .map(|(alias, backend)| (alias.as_str(), backend))
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
