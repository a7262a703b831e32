//! Type cache and subscriber registry.
//!
//! One slot per definition identity holds the current runtime type. Slots
//! survive regeneration together with their subscriber bookkeeping, so types
//! that depend on a definition keep being notified across generations.

pub mod subscribers;
pub mod type_cache;

pub use subscribers::{Bookkeeping, TypeSubscriber};
pub use type_cache::TypeCache;
