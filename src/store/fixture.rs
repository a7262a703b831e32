use crate::core::Result;
use crate::definition::{
    BaseDefinition, FieldDefinition, OrderingDefinition, SchemaDefinition,
    UniqueTogetherDefinition,
};
use serde::{Deserialize, Serialize};

/// Raw definition rows, as dumped from or loaded into a store.
///
/// Rows carry their ids. Loading replays them through the ordinary
/// lifecycle with every event flagged `raw`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub schemas: Vec<SchemaDefinition>,
    pub bases: Vec<BaseDefinition>,
    pub fields: Vec<FieldDefinition>,
    pub orderings: Vec<OrderingDefinition>,
    pub unique_together: Vec<UniqueTogetherDefinition>,
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
            && self.bases.is_empty()
            && self.fields.is_empty()
            && self.orderings.is_empty()
            && self.unique_together.is_empty()
    }
}
