use super::{
    BaseDefinition, FieldDefinition, OrderingDefinition, SchemaDefinition,
    UniqueTogetherDefinition,
};
use crate::core::{FieldId, Result, SchemaId};

/// A schema definition together with all of its children.
///
/// Bases and orderings are sorted by `order`, fields and unique-together
/// definitions by creation.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionSnapshot {
    pub schema: SchemaDefinition,
    pub bases: Vec<BaseDefinition>,
    pub fields: Vec<FieldDefinition>,
    pub orderings: Vec<OrderingDefinition>,
    pub unique_together: Vec<UniqueTogetherDefinition>,
}

impl DefinitionSnapshot {
    pub fn field(&self, id: FieldId) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.id == id)
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Anything the type cache can read definition graphs from.
///
/// Implemented by the committed store and by the staged data of an in-flight
/// store transaction.
pub trait DefinitionSource: Send + Sync {
    fn snapshot(&self, id: SchemaId) -> Result<DefinitionSnapshot>;
}
