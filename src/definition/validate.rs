use super::{FieldDefinition, LOOKUP_SEP};
use crate::core::{MutantError, Result};
use regex::Regex;

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
}

pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}

/// Rejects anything that cannot be used as a type, field or namespace name.
pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if !is_identifier(value) {
        return Err(MutantError::validation(
            field,
            format!("'{}' is not a valid identifier", value),
        ));
    }
    if value.contains(LOOKUP_SEP) {
        return Err(MutantError::validation(
            field,
            format!("'{}' cannot contain '{}'", value, LOOKUP_SEP),
        ));
    }
    Ok(())
}

/// Checks a field definition in isolation.
pub fn validate_field(field: &FieldDefinition) -> Result<()> {
    validate_identifier("name", &field.name)?;

    if let Some(options) = field.kind.temporal_options() {
        if options.auto_now && options.auto_now_add {
            return Err(MutantError::validation(
                "auto_now",
                "auto_now and auto_now_add are mutually exclusive",
            ));
        }
        if (options.auto_now || options.auto_now_add) && field.default.is_some() {
            return Err(MutantError::validation(
                "default",
                "automatic temporal fields cannot declare a default",
            ));
        }
    }

    if let Some(default) = &field.default {
        let data_type = field.kind.data_type();
        if !data_type.is_compatible(default) {
            return Err(MutantError::validation(
                "default",
                format!("default {} is not a valid {}", default, data_type),
            ));
        }
    }

    if field.primary_key && field.nullable {
        return Err(MutantError::validation(
            "primary_key",
            "a primary key cannot be nullable",
        ));
    }

    if field.kind.max_length() == Some(0) {
        return Err(MutantError::validation(
            "max_length",
            "max_length must be positive",
        ));
    }

    Ok(())
}

/// Human readable name derived from a type name: `ShoppingCart` -> `shopping cart`.
pub fn verbose_name_from(type_name: &str) -> String {
    CAMEL_BOUNDARY
        .replace_all(type_name, "$1 $2")
        .to_lowercase()
        .replace('_', " ")
        .trim()
        .to_string()
}
