//! Schema synchronization.
//!
//! The [`MigrationCoordinator`] listens to definition lifecycle events and
//! turns them into [`SchemaEditor`] calls on every connection the router
//! allows. [`MemoryDatabase`] is the bundled backend.

pub mod coordinator;
pub mod editor;
pub mod memory;
pub mod router;

pub use coordinator::MigrationCoordinator;
pub use editor::{MigrationBackend, Savepoint, SchemaEditor};
pub use memory::{Column, MemoryDatabase, SchemaOperation};
pub use router::{AllowAll, ConnectionRegistry, DatabaseRouter, NamespaceRouter};
