use crate::core::{DataType, FieldId, SchemaId, TypeKey, Value};
use serde::{Deserialize, Serialize};

/// One column of a synthesized type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: FieldId,
    pub owner: SchemaId,
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
}

impl FieldDefinition {
    /// Storage column backing this field.
    pub fn column(&self) -> String {
        match self.kind {
            FieldKind::ForeignKey { .. } => format!("{}_id", self.name),
            _ => self.name.clone(),
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::ForeignKey { .. })
    }
}

/// Storage field kinds together with their kind-specific options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    Float,
    Boolean,
    Text {
        #[serde(default)]
        max_length: Option<u32>,
    },
    Date(TemporalOptions),
    Time(TemporalOptions),
    DateTime(TemporalOptions),
    ForeignKey {
        target: RelationTarget,
    },
}

impl FieldKind {
    pub fn text() -> Self {
        Self::Text { max_length: None }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Integer | Self::ForeignKey { .. } => DataType::Integer,
            Self::Float => DataType::Float,
            Self::Boolean => DataType::Boolean,
            Self::Text { .. } => DataType::Text,
            Self::Date(_) => DataType::Date,
            Self::Time(_) => DataType::Time,
            Self::DateTime(_) => DataType::DateTime,
        }
    }

    pub fn temporal_options(&self) -> Option<&TemporalOptions> {
        match self {
            Self::Date(options) | Self::Time(options) | Self::DateTime(options) => Some(options),
            _ => None,
        }
    }

    pub fn relation_target(&self) -> Option<&RelationTarget> {
        match self {
            Self::ForeignKey { target } => Some(target),
            _ => None,
        }
    }

    pub fn max_length(&self) -> Option<u32> {
        match self {
            Self::Text { max_length } => *max_length,
            _ => None,
        }
    }
}

/// Options shared by the date, time and datetime kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalOptions {
    /// Set to now every time a record is saved.
    pub auto_now: bool,
    /// Set to now when a record is first created.
    pub auto_now_add: bool,
}

impl TemporalOptions {
    pub fn auto_now() -> Self {
        Self {
            auto_now: true,
            auto_now_add: false,
        }
    }

    pub fn auto_now_add() -> Self {
        Self {
            auto_now: false,
            auto_now_add: true,
        }
    }
}

/// Type a relation field points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationTarget {
    /// Another dynamically synthesized type.
    Schema(SchemaId),
    /// A statically declared type known to the registry.
    Declared(TypeKey),
}

/// Input for creating a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDraft {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub default: Option<Value>,
    pub primary_key: bool,
    pub unique: bool,
    /// Fills existing rows when the column is added; never persisted.
    pub initial_value: Option<Value>,
}

impl FieldDraft {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            nullable: false,
            default: None,
            primary_key: false,
            unique: false,
            initial_value: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn initial_value(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    pub(crate) fn to_definition(&self, id: FieldId, owner: SchemaId) -> FieldDefinition {
        FieldDefinition {
            id,
            owner,
            name: self.name.clone(),
            kind: self.kind.clone(),
            nullable: self.nullable,
            default: self.default.clone(),
            primary_key: self.primary_key,
            unique: self.unique,
        }
    }
}
