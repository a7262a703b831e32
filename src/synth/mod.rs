//! Turns definition graphs into runtime types.

pub mod runtime_type;
pub mod synthesizer;

pub use runtime_type::{BaseType, FieldDescriptor, FieldOrigin, RuntimeType, TypeOptions};
pub use synthesizer::TypeSynthesizer;
