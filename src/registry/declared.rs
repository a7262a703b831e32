use crate::core::{BaseId, DataType, TypeKey};
use crate::definition::RelationTarget;
use crate::synth::{FieldDescriptor, FieldOrigin};

/// A type declared in code rather than synthesized from definitions.
///
/// Abstract declared types contribute their fields to inheriting types.
/// Concrete ones own a table and contribute a parent link instead.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredType {
    pub key: TypeKey,
    pub is_abstract: bool,
    pub fields: Vec<FieldDescriptor>,
    pub ordering: Vec<String>,
}

impl DeclaredType {
    pub fn new(key: TypeKey) -> Self {
        Self {
            key,
            is_abstract: false,
            fields: Vec::new(),
            ordering: Vec::new(),
        }
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn ordering(mut self, terms: &[&str]) -> Self {
        self.ordering = terms.iter().map(|term| term.to_string()).collect();
        self
    }

    /// Name of the parent link a concrete declared type contributes.
    pub fn parent_link_name(&self) -> String {
        format!("{}_ptr", self.key.name.to_lowercase())
    }

    /// Fields a type inheriting from this one gains through `base`.
    pub fn contributed_fields(&self, base: BaseId) -> Vec<FieldDescriptor> {
        if self.is_abstract {
            return self
                .fields
                .iter()
                .cloned()
                .map(|mut field| {
                    field.origin = FieldOrigin::Base(base);
                    field
                })
                .collect();
        }

        let name = self.parent_link_name();
        vec![FieldDescriptor {
            column: format!("{}_id", name),
            unique: true,
            relation: Some(RelationTarget::Declared(self.key.clone())),
            parent_link: true,
            origin: FieldOrigin::Base(base),
            ..FieldDescriptor::new(&name, DataType::Integer)
        }]
    }
}
