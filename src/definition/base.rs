use crate::core::{BaseId, SchemaId, TypeKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares that the synthesized type inherits from another type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseDefinition {
    pub id: BaseId,
    pub owner: SchemaId,
    /// Base precedence; unique per owner, lowest first.
    pub order: u32,
    pub kind: BaseKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseKind {
    /// A type tracked by the type registry, addressed by its key.
    Model { type_key: TypeKey },
    /// A plain mixin or abstract declared type, addressed by reference path.
    Mixin { reference: String },
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model { type_key } => write!(f, "model {}", type_key),
            Self::Mixin { reference } => write!(f, "mixin {}", reference),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaseDraft {
    /// Explicit order; appended after the current last base when absent.
    pub order: Option<u32>,
    pub kind: BaseKind,
}

impl BaseDraft {
    pub fn model(type_key: TypeKey) -> Self {
        Self {
            order: None,
            kind: BaseKind::Model { type_key },
        }
    }

    pub fn mixin(reference: &str) -> Self {
        Self {
            order: None,
            kind: BaseKind::Mixin {
                reference: reference.to_string(),
            },
        }
    }

    pub fn at(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }
}
