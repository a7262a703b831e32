use crate::core::{FieldId, SchemaId, UniqueTogetherId};
use serde::{Deserialize, Serialize};

/// A multi-column uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueTogetherDefinition {
    pub id: UniqueTogetherId,
    pub owner: SchemaId,
    /// Member fields; kept sorted and free of duplicates.
    #[serde(default)]
    pub members: Vec<FieldId>,
}

impl UniqueTogetherDefinition {
    pub fn new(id: UniqueTogetherId, owner: SchemaId, members: Vec<FieldId>) -> Self {
        Self {
            id,
            owner,
            members: normalize_members(members),
        }
    }

    pub fn contains(&self, field: FieldId) -> bool {
        self.members.binary_search(&field).is_ok()
    }
}

pub(crate) fn normalize_members(mut members: Vec<FieldId>) -> Vec<FieldId> {
    members.sort();
    members.dedup();
    members
}

/// How a membership change alters the member set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    Add,
    Remove,
    Clear,
    Set,
}
