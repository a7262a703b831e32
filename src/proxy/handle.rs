use super::Record;
use crate::cache::TypeCache;
use crate::core::{MutantError, Result, SchemaId, Value};
use crate::synth::{FieldDescriptor, RuntimeType};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Stable handle to "the current type of definition X".
///
/// The wrapped type is checked on every [`resolve`](Self::resolve); once it
/// is obsolete the handle looks its definition up again and swaps the new
/// type in. Holders never have to re-fetch a handle after a regeneration.
pub struct ModelHandle {
    identity: SchemaId,
    current: RwLock<Arc<RuntimeType>>,
    cache: Arc<TypeCache>,
}

impl ModelHandle {
    pub fn new(cache: Arc<TypeCache>, identity: SchemaId) -> Result<Self> {
        let current = cache.current(identity)?;
        Ok(Self::from_type(cache, current))
    }

    pub(crate) fn from_type(cache: Arc<TypeCache>, runtime: Arc<RuntimeType>) -> Self {
        Self {
            identity: runtime.identity(),
            current: RwLock::new(runtime),
            cache,
        }
    }

    pub fn identity(&self) -> SchemaId {
        self.identity
    }

    /// The current runtime type, re-resolved if the held one is obsolete.
    ///
    /// Fails with `StaleReference` once the definition has been deleted.
    pub fn resolve(&self) -> Result<Arc<RuntimeType>> {
        {
            let current = self.current.read()?;
            if !current.is_obsolete() {
                return Ok(current.clone());
            }
        }

        let fresh = self.cache.current(self.identity).map_err(|err| match err {
            MutantError::NotFound(what) => MutantError::StaleReference(format!(
                "{} can no longer be resolved: {} not found",
                self.identity, what
            )),
            other => other,
        })?;
        *self.current.write()? = fresh.clone();
        Ok(fresh)
    }

    /// Whether both handles currently resolve to the same type.
    pub fn same_type(&self, other: &ModelHandle) -> Result<bool> {
        Ok(Arc::ptr_eq(&self.resolve()?, &other.resolve()?))
    }

    /// Whether this handle currently resolves to `runtime`.
    pub fn is(&self, runtime: &RuntimeType) -> Result<bool> {
        Ok(std::ptr::eq(Arc::as_ptr(&self.resolve()?), runtime))
    }

    pub fn table_name(&self) -> Result<String> {
        Ok(self.resolve()?.table_name().to_string())
    }

    pub fn fields(&self) -> Result<Vec<FieldDescriptor>> {
        Ok(self.resolve()?.fields().to_vec())
    }

    pub fn field(&self, name: &str) -> Result<Option<FieldDescriptor>> {
        Ok(self.resolve()?.field(name).cloned())
    }

    pub fn generation(&self) -> Result<u64> {
        Ok(self.resolve()?.generation())
    }

    /// Instantiate a record of the current type.
    pub fn new_record<I, K>(&self, values: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let current = self.resolve()?;
        Record::new(&*current, values)
    }

    /// Type check by definition identity; records of any earlier generation,
    /// including ones made before the cache was cleared, still belong to the
    /// type.
    pub fn is_instance(&self, record: &Record) -> Result<bool> {
        Ok(record.type_id() == self.resolve()?.identity())
    }
}

impl Clone for ModelHandle {
    fn clone(&self) -> Self {
        let current = match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Self {
            identity: self.identity,
            current: RwLock::new(current),
            cache: self.cache.clone(),
        }
    }
}

/// Compares resolved types. A handle that cannot resolve (deleted definition,
/// poisoned lock) compares unequal to everything; use
/// [`ModelHandle::same_type`] to see the error.
impl PartialEq for ModelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_type(other).unwrap_or(false)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("identity", &self.identity)
            .finish()
    }
}
