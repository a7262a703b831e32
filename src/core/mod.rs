pub mod error;
pub mod types;
pub mod value;

pub use error::{MutantError, Result};
pub use types::{BaseId, FieldId, OrderingId, SchemaId, TypeKey, UniqueTogetherId};
pub use value::{DataType, Value};
