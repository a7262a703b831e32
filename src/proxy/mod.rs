//! Handles and records handed out to callers.

pub mod handle;
pub mod record;

pub use handle::ModelHandle;
pub use record::Record;
