use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! definition_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw ID value
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

definition_id!(
    /// Stable identity of a `SchemaDefinition`; keys the type cache.
    SchemaId,
    "schema"
);
definition_id!(BaseId, "base");
definition_id!(FieldId, "field");
definition_id!(OrderingId, "ordering");
definition_id!(UniqueTogetherId, "unique");

/// Namespaced name of a type, `namespace.Name`.
///
/// Statically declared types and synthesized ones share this key space; the
/// registry refuses dynamic definitions inside a namespace it already owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey {
    pub namespace: String,
    pub name: String,
}

impl TypeKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses `namespace.Name`.
    pub fn parse(value: &str) -> Option<Self> {
        let (namespace, name) = value.split_once('.')?;
        if namespace.is_empty() || name.is_empty() || name.contains('.') {
            return None;
        }
        Some(Self::new(namespace, name))
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}
