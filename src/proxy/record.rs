use crate::core::{DataType, MutantError, Result, SchemaId, Value};
use crate::synth::{FieldDescriptor, RuntimeType};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

/// An instance of a synthesized type, keyed by field name.
///
/// Records remember the identity and generation they were built against so a
/// type check survives regeneration while stale shapes remain detectable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    type_id: SchemaId,
    generation: u64,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Build a record of `runtime`, applying defaults and automatic temporal
    /// values. Unknown fields and missing required values are rejected.
    pub fn new<I, K>(runtime: &RuntimeType, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut given: BTreeMap<String, Value> = values
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        if let Some(unknown) = given.keys().find(|name| runtime.field(name).is_none()) {
            return Err(MutantError::validation(
                unknown.clone(),
                format!("{} has no field '{}'", runtime.key(), unknown),
            ));
        }

        let mut record = Self {
            type_id: runtime.identity(),
            generation: runtime.generation(),
            values: BTreeMap::new(),
        };

        for field in runtime.fields() {
            let value = match given.remove(&field.name) {
                Some(value) => value,
                None => initial_value(field),
            };
            record.values.insert(field.name.clone(), value);
        }

        record.validate(runtime)?;
        Ok(record)
    }

    pub fn type_id(&self) -> SchemaId {
        self.type_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| MutantError::validation(name, "no such field"))?;
        *slot = value.into();
        Ok(())
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Refresh `auto_now` fields; called whenever the record is saved.
    pub fn touch(&mut self, runtime: &RuntimeType) {
        for field in runtime.fields().iter().filter(|field| field.temporal.auto_now) {
            if let Some(now) = now_for(field.data_type) {
                self.values.insert(field.name.clone(), now);
            }
        }
    }

    /// Values in storage column order of `runtime`.
    pub fn columns(&self, runtime: &RuntimeType) -> Vec<(String, Value)> {
        runtime
            .fields()
            .iter()
            .map(|field| {
                let value = self.values.get(&field.name).cloned().unwrap_or(Value::Null);
                (field.column.clone(), value)
            })
            .collect()
    }

    fn validate(&self, runtime: &RuntimeType) -> Result<()> {
        for field in runtime.fields() {
            let value = self.values.get(&field.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if !field.nullable && !field.auto_increment {
                    return Err(MutantError::validation(
                        field.name.clone(),
                        "a value is required",
                    ));
                }
                continue;
            }
            if !field.data_type.is_compatible(value) {
                return Err(MutantError::validation(
                    field.name.clone(),
                    format!("{} is not a valid {}", value, field.data_type),
                ));
            }
            if let (Some(max), Value::Text(text)) = (field.max_length, value)
                && text.chars().count() > max as usize
            {
                return Err(MutantError::validation(
                    field.name.clone(),
                    format!("longer than {} characters", max),
                ));
            }
        }
        Ok(())
    }
}

fn initial_value(field: &FieldDescriptor) -> Value {
    if let Some(default) = &field.default {
        return default.clone();
    }
    if field.temporal.auto_now || field.temporal.auto_now_add {
        return now_for(field.data_type).unwrap_or(Value::Null);
    }
    Value::Null
}

fn now_for(data_type: DataType) -> Option<Value> {
    let now = Utc::now().naive_utc();
    match data_type {
        DataType::Date => Some(Value::Date(now.date())),
        DataType::Time => Some(Value::Time(now.time())),
        DataType::DateTime => Some(Value::DateTime(now)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Bookkeeping;
    use crate::config::EngineConfig;
    use crate::core::FieldId;
    use crate::definition::{
        DefinitionSnapshot, FieldDraft, FieldKind, SchemaDefinition, TemporalOptions,
    };
    use crate::registry::TypeRegistry;
    use crate::synth::TypeSynthesizer;

    fn runtime(fields: Vec<FieldDraft>) -> RuntimeType {
        let snapshot = DefinitionSnapshot {
            schema: SchemaDefinition {
                id: SchemaId(1),
                namespace: "blog".to_string(),
                type_name: "Post".to_string(),
                display_name: None,
                display_name_plural: None,
                externally_managed: false,
            },
            bases: Vec::new(),
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, draft)| draft.to_definition(FieldId(i as u64 + 1), SchemaId(1)))
                .collect(),
            orderings: Vec::new(),
            unique_together: Vec::new(),
        };
        let registry = TypeRegistry::new(4);
        let config = EngineConfig::default();
        TypeSynthesizer::new(&registry, &config)
            .synthesize(&snapshot, Bookkeeping::new())
            .unwrap()
    }

    #[test]
    fn test_defaults_and_auto_values() {
        let post = runtime(vec![
            FieldDraft::new("title", FieldKind::text()),
            FieldDraft::new("views", FieldKind::Integer).default_value(0i64),
            FieldDraft::new("created", FieldKind::DateTime(TemporalOptions::auto_now_add())),
            FieldDraft::new("summary", FieldKind::text()).nullable(),
        ]);

        let record = Record::new(&post, [("title", Value::from("hello"))]).unwrap();
        assert_eq!(record.get("views"), Some(&Value::Integer(0)));
        assert_eq!(record.get("summary"), Some(&Value::Null));
        assert_eq!(record.get("id"), Some(&Value::Null));
        assert!(matches!(record.get("created"), Some(Value::DateTime(_))));
    }

    #[test]
    fn test_unknown_and_missing_fields_are_rejected() {
        let post = runtime(vec![FieldDraft::new("title", FieldKind::text())]);

        let unknown = Record::new(
            &post,
            [("title", Value::from("x")), ("nope", Value::from(1i64))],
        );
        assert!(unknown.unwrap_err().is_validation());

        let missing = Record::new(&post, Vec::<(String, Value)>::new());
        assert!(missing.unwrap_err().is_validation());
    }

    #[test]
    fn test_type_and_length_checks() {
        let post = runtime(vec![FieldDraft::new(
            "code",
            FieldKind::Text {
                max_length: Some(3),
            },
        )]);

        assert!(Record::new(&post, [("code", Value::from(5i64))]).is_err());
        assert!(Record::new(&post, [("code", Value::from("abcd"))]).is_err());
        assert!(Record::new(&post, [("code", Value::from("abc"))]).is_ok());
    }

    #[test]
    fn test_columns_follow_type_order() {
        let post = runtime(vec![FieldDraft::new("title", FieldKind::text())]);
        let record = Record::new(&post, [("title", Value::from("a"))]).unwrap();
        let columns: Vec<String> = record
            .columns(&post)
            .into_iter()
            .map(|(column, _)| column)
            .collect();
        assert_eq!(columns, vec!["id".to_string(), "title".to_string()]);
    }
}
