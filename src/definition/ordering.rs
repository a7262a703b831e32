use crate::core::{OrderingId, SchemaId};
use serde::{Deserialize, Serialize};

/// Lookup meaning "random order"; exempt from path validation.
pub const RANDOM_ORDERING: &str = "?";

/// Separator between the steps of an ordering lookup.
pub const LOOKUP_SEP: &str = "__";

/// One term of the default ordering of a synthesized type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingDefinition {
    pub id: OrderingId,
    pub owner: SchemaId,
    pub order: u32,
    /// Field names separated by `__` or `.`, crossing at most one relation.
    pub lookup: String,
    #[serde(default)]
    pub descending: bool,
}

impl OrderingDefinition {
    /// The term as it appears in type options, `-lookup` when descending.
    pub fn defined_ordering(&self) -> String {
        if self.descending {
            format!("-{}", self.lookup)
        } else {
            self.lookup.clone()
        }
    }

    /// Path steps of the lookup.
    pub fn steps(&self) -> Vec<&str> {
        split_lookup(&self.lookup)
    }
}

pub fn split_lookup(lookup: &str) -> Vec<&str> {
    lookup
        .split(LOOKUP_SEP)
        .flat_map(|part| part.split('.'))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderingDraft {
    pub order: Option<u32>,
    pub lookup: String,
    pub descending: bool,
}

impl OrderingDraft {
    pub fn ascending(lookup: &str) -> Self {
        Self {
            order: None,
            lookup: lookup.to_string(),
            descending: false,
        }
    }

    pub fn descending(lookup: &str) -> Self {
        Self {
            descending: true,
            ..Self::ascending(lookup)
        }
    }

    pub fn at(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }
}
