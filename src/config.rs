use crate::core::Result;
use serde::{Deserialize, Serialize};

/// Engine configuration
///
/// Controls how synthesized types are named in the store and how schema
/// alterations treat existing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix of every synthesized table name
    pub table_prefix: String,

    /// Name of the auto-assigned primary key
    pub implicit_primary_key: String,

    /// Fail alterations that cannot convert existing values
    pub strict_alterations: bool,

    /// Capacity of the registry's `namespace.Name` lookup cache
    pub name_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            table_prefix: "mutant".to_string(),
            implicit_primary_key: "id".to_string(),
            strict_alterations: true,
            name_cache_capacity: 128,
        }
    }

    /// Set the table prefix
    pub fn table_prefix(mut self, prefix: &str) -> Self {
        self.table_prefix = prefix.to_string();
        self
    }

    /// Set the name of the implicit primary key
    pub fn implicit_primary_key(mut self, name: &str) -> Self {
        self.implicit_primary_key = name.to_string();
        self
    }

    /// Enable or disable strict alterations
    pub fn strict_alterations(mut self, strict: bool) -> Self {
        self.strict_alterations = strict;
        self
    }

    /// Set the name cache capacity
    pub fn name_cache_capacity(mut self, capacity: usize) -> Self {
        self.name_cache_capacity = capacity;
        self
    }

    /// Parse from a JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Storage table name for `namespace.TypeName`.
    pub fn table_name(&self, namespace: &str, type_name: &str) -> String {
        format!(
            "{}_{}_{}",
            self.table_prefix,
            namespace,
            type_name.to_lowercase()
        )
    }
}
