use super::{BaseDraft, FieldDraft, OrderingDraft};
use crate::core::{SchemaId, TypeKey};
use serde::{Deserialize, Serialize};

/// One synthesized type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub id: SchemaId,
    pub namespace: String,
    pub type_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub display_name_plural: Option<String>,
    /// The table is migrated by someone else; lifecycle events never issue DDL.
    #[serde(default)]
    pub externally_managed: bool,
}

impl SchemaDefinition {
    pub fn key(&self) -> TypeKey {
        TypeKey::new(self.namespace.clone(), self.type_name.clone())
    }
}

/// Input for creating a schema, optionally together with its children.
///
/// Children listed here are staged in the same transaction as the schema and
/// are materialized by the single create-table of the owner.
#[derive(Debug, Clone, Default)]
pub struct SchemaDraft {
    pub namespace: String,
    pub type_name: String,
    pub display_name: Option<String>,
    pub display_name_plural: Option<String>,
    pub externally_managed: bool,
    pub fields: Vec<FieldDraft>,
    pub bases: Vec<BaseDraft>,
    pub orderings: Vec<OrderingDraft>,
    /// Unique-together sets by field name; names refer to `fields`.
    pub unique_together: Vec<Vec<String>>,
}

impl SchemaDraft {
    pub fn new(namespace: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn display_name(mut self, singular: &str, plural: &str) -> Self {
        self.display_name = Some(singular.to_string());
        self.display_name_plural = Some(plural.to_string());
        self
    }

    pub fn externally_managed(mut self) -> Self {
        self.externally_managed = true;
        self
    }

    pub fn field(mut self, field: FieldDraft) -> Self {
        self.fields.push(field);
        self
    }

    pub fn base(mut self, base: BaseDraft) -> Self {
        self.bases.push(base);
        self
    }

    pub fn ordering(mut self, ordering: OrderingDraft) -> Self {
        self.orderings.push(ordering);
        self
    }

    pub fn unique_together(mut self, names: &[&str]) -> Self {
        self.unique_together
            .push(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub(crate) fn to_definition(&self, id: SchemaId) -> SchemaDefinition {
        SchemaDefinition {
            id,
            namespace: self.namespace.clone(),
            type_name: self.type_name.clone(),
            display_name: self.display_name.clone(),
            display_name_plural: self.display_name_plural.clone(),
            externally_managed: self.externally_managed,
        }
    }
}
