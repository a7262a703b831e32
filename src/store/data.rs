use crate::core::{
    BaseId, FieldId, MutantError, OrderingId, Result, SchemaId, UniqueTogetherId,
};
use crate::definition::validate::{validate_field, validate_identifier};
use crate::definition::{
    BaseDefinition, DefinitionSnapshot, DefinitionSource, FieldDefinition, OrderingDefinition,
    RelationTarget, SchemaDefinition, UniqueTogetherDefinition,
};
use im::OrdMap;
use std::collections::HashSet;

/// Every persisted definition, keyed by id.
///
/// Persistent maps make a clone O(1), so each store transaction stages on a
/// private copy and either publishes it whole or drops it.
#[derive(Debug, Clone, Default)]
pub struct DefinitionData {
    schemas: OrdMap<SchemaId, SchemaDefinition>,
    bases: OrdMap<BaseId, BaseDefinition>,
    fields: OrdMap<FieldId, FieldDefinition>,
    orderings: OrdMap<OrderingId, OrderingDefinition>,
    uniques: OrdMap<UniqueTogetherId, UniqueTogetherDefinition>,
}

impl DefinitionData {
    pub fn schema(&self, id: SchemaId) -> Option<&SchemaDefinition> {
        self.schemas.get(&id)
    }

    pub fn base(&self, id: BaseId) -> Option<&BaseDefinition> {
        self.bases.get(&id)
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldDefinition> {
        self.fields.get(&id)
    }

    pub fn ordering(&self, id: OrderingId) -> Option<&OrderingDefinition> {
        self.orderings.get(&id)
    }

    pub fn unique(&self, id: UniqueTogetherId) -> Option<&UniqueTogetherDefinition> {
        self.uniques.get(&id)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &SchemaDefinition> {
        self.schemas.values()
    }

    pub fn find_schema(&self, namespace: &str, type_name: &str) -> Option<&SchemaDefinition> {
        self.schemas
            .values()
            .find(|schema| schema.namespace == namespace && schema.type_name == type_name)
    }

    pub fn bases_of(&self, owner: SchemaId) -> Vec<&BaseDefinition> {
        let mut bases: Vec<_> = self.bases.values().filter(|b| b.owner == owner).collect();
        bases.sort_by_key(|base| (base.order, base.id));
        bases
    }

    /// Fields of `owner` in creation order.
    pub fn fields_of(&self, owner: SchemaId) -> Vec<&FieldDefinition> {
        self.fields.values().filter(|f| f.owner == owner).collect()
    }

    pub fn orderings_of(&self, owner: SchemaId) -> Vec<&OrderingDefinition> {
        let mut orderings: Vec<_> = self
            .orderings
            .values()
            .filter(|o| o.owner == owner)
            .collect();
        orderings.sort_by_key(|ordering| (ordering.order, ordering.id));
        orderings
    }

    pub fn uniques_of(&self, owner: SchemaId) -> Vec<&UniqueTogetherDefinition> {
        self.uniques.values().filter(|u| u.owner == owner).collect()
    }

    /// Unique-together definitions listing `field` as a member.
    pub fn uniques_containing(&self, field: FieldId) -> Vec<&UniqueTogetherDefinition> {
        self.uniques.values().filter(|u| u.contains(field)).collect()
    }

    /// Relation fields of other schemas pointing at `target`.
    pub fn fields_targeting(&self, target: SchemaId) -> Vec<&FieldDefinition> {
        self.fields
            .values()
            .filter(|field| {
                field.owner != target
                    && field.kind.relation_target() == Some(&RelationTarget::Schema(target))
            })
            .collect()
    }

    pub fn next_base_order(&self, owner: SchemaId) -> u32 {
        self.bases_of(owner)
            .last()
            .map(|base| base.order + 1)
            .unwrap_or(0)
    }

    pub fn next_ordering_order(&self, owner: SchemaId) -> u32 {
        self.orderings_of(owner)
            .last()
            .map(|ordering| ordering.order + 1)
            .unwrap_or(0)
    }

    /// Largest id of any kind; fixtures carry their own ids.
    pub fn max_id(&self) -> u64 {
        [
            self.schemas.keys().last().map(SchemaId::as_u64),
            self.bases.keys().last().map(BaseId::as_u64),
            self.fields.keys().last().map(FieldId::as_u64),
            self.orderings.keys().last().map(OrderingId::as_u64),
            self.uniques.keys().last().map(UniqueTogetherId::as_u64),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
    }

    pub fn build_snapshot(&self, id: SchemaId) -> Result<DefinitionSnapshot> {
        let schema = self
            .schema(id)
            .cloned()
            .ok_or_else(|| MutantError::NotFound(format!("schema {}", id)))?;
        Ok(DefinitionSnapshot {
            schema,
            bases: self.bases_of(id).into_iter().cloned().collect(),
            fields: self.fields_of(id).into_iter().cloned().collect(),
            orderings: self.orderings_of(id).into_iter().cloned().collect(),
            unique_together: self.uniques_of(id).into_iter().cloned().collect(),
        })
    }

    pub(crate) fn put_schema(&mut self, schema: SchemaDefinition) -> Option<SchemaDefinition> {
        self.schemas.insert(schema.id, schema)
    }

    pub(crate) fn put_base(&mut self, base: BaseDefinition) -> Option<BaseDefinition> {
        self.bases.insert(base.id, base)
    }

    pub(crate) fn put_field(&mut self, field: FieldDefinition) -> Option<FieldDefinition> {
        self.fields.insert(field.id, field)
    }

    pub(crate) fn put_ordering(
        &mut self,
        ordering: OrderingDefinition,
    ) -> Option<OrderingDefinition> {
        self.orderings.insert(ordering.id, ordering)
    }

    pub(crate) fn put_unique(
        &mut self,
        unique: UniqueTogetherDefinition,
    ) -> Option<UniqueTogetherDefinition> {
        self.uniques.insert(unique.id, unique)
    }

    pub(crate) fn remove_schema(&mut self, id: SchemaId) -> Option<SchemaDefinition> {
        self.schemas.remove(&id)
    }

    pub(crate) fn remove_base(&mut self, id: BaseId) -> Option<BaseDefinition> {
        self.bases.remove(&id)
    }

    pub(crate) fn remove_field(&mut self, id: FieldId) -> Option<FieldDefinition> {
        self.fields.remove(&id)
    }

    pub(crate) fn remove_ordering(&mut self, id: OrderingId) -> Option<OrderingDefinition> {
        self.orderings.remove(&id)
    }

    pub(crate) fn remove_unique(&mut self, id: UniqueTogetherId) -> Option<UniqueTogetherDefinition> {
        self.uniques.remove(&id)
    }

    /// Graph-level consistency of the whole definition set.
    ///
    /// Checks identifiers, per-owner uniqueness of names, orders and primary
    /// keys, and that every reference points at an existing entity of the
    /// right owner.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        for schema in self.schemas.values() {
            validate_identifier("namespace", &schema.namespace)?;
            validate_identifier("type_name", &schema.type_name)?;
            if !keys.insert((schema.namespace.as_str(), schema.type_name.as_str())) {
                return Err(MutantError::validation(
                    "type_name",
                    format!("{} already exists", schema.key()),
                ));
            }
        }

        let mut names = HashSet::new();
        let mut keyed_owners = HashSet::new();
        for field in self.fields.values() {
            self.require_owner(field.owner)?;
            validate_field(field)?;
            if !names.insert((field.owner, field.name.as_str())) {
                return Err(MutantError::validation(
                    "name",
                    format!("field '{}' already exists on {}", field.name, field.owner),
                ));
            }
            if field.primary_key && !keyed_owners.insert(field.owner) {
                return Err(MutantError::validation(
                    "primary_key",
                    format!("{} already has a primary key", field.owner),
                ));
            }
            if let Some(RelationTarget::Schema(target)) = field.kind.relation_target()
                && !self.schemas.contains_key(target)
            {
                return Err(MutantError::validation(
                    "target",
                    format!("relation '{}' targets unknown {}", field.name, target),
                ));
            }
        }

        let mut orders = HashSet::new();
        for base in self.bases.values() {
            self.require_owner(base.owner)?;
            if !orders.insert((base.owner, base.order)) {
                return Err(MutantError::validation(
                    "order",
                    format!("{} already has a base at order {}", base.owner, base.order),
                ));
            }
        }

        for ordering in self.orderings.values() {
            self.require_owner(ordering.owner)?;
            if ordering.lookup.is_empty() {
                return Err(MutantError::validation("lookup", "lookup cannot be empty"));
            }
        }

        for unique in self.uniques.values() {
            self.require_owner(unique.owner)?;
            for member in &unique.members {
                match self.fields.get(member) {
                    Some(field) if field.owner == unique.owner => {}
                    Some(field) => {
                        return Err(MutantError::validation(
                            "members",
                            format!(
                                "field '{}' belongs to {}, not {}",
                                field.name, field.owner, unique.owner
                            ),
                        ));
                    }
                    None => {
                        return Err(MutantError::validation(
                            "members",
                            format!("unknown member {}", member),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    fn require_owner(&self, owner: SchemaId) -> Result<()> {
        if self.schemas.contains_key(&owner) {
            Ok(())
        } else {
            Err(MutantError::validation(
                "owner",
                format!("unknown owner {}", owner),
            ))
        }
    }
}

impl DefinitionSource for DefinitionData {
    fn snapshot(&self, id: SchemaId) -> Result<DefinitionSnapshot> {
        self.build_snapshot(id)
    }
}
