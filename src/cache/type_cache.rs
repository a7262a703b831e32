use super::{Bookkeeping, TypeSubscriber};
use crate::config::EngineConfig;
use crate::core::{Result, SchemaId};
use crate::definition::DefinitionSource;
use crate::registry::TypeRegistry;
use crate::synth::{RuntimeType, TypeSynthesizer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Level, event};

/// The cache slot of one definition identity.
///
/// The slot mutex is the per-definition synthesis lock: synthesis, the DDL
/// that goes with it and the swap of the current type all happen under it.
struct TypeSlot {
    current: Mutex<Option<Arc<RuntimeType>>>,
    bookkeeping: Arc<Bookkeeping>,
}

impl TypeSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
            bookkeeping: Bookkeeping::new(),
        })
    }
}

/// Process-wide map from definition identity to its current runtime type.
pub struct TypeCache {
    slots: Mutex<HashMap<SchemaId, Arc<TypeSlot>>>,
    registry: Arc<TypeRegistry>,
    config: EngineConfig,
    source: Arc<dyn DefinitionSource>,
}

impl TypeCache {
    pub fn new(
        registry: Arc<TypeRegistry>,
        config: EngineConfig,
        source: Arc<dyn DefinitionSource>,
    ) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            registry,
            config,
            source,
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn synthesizer(&self) -> TypeSynthesizer<'_> {
        TypeSynthesizer::new(&self.registry, &self.config)
    }

    /// The current type of `id`, synthesized from committed definitions when
    /// absent, obsolete, or when `force_rebuild` is set.
    pub fn get_current(&self, id: SchemaId, force_rebuild: bool) -> Result<Arc<RuntimeType>> {
        self.current_with(id, self.source.as_ref(), force_rebuild)
    }

    pub fn current(&self, id: SchemaId) -> Result<Arc<RuntimeType>> {
        self.get_current(id, false)
    }

    /// Like [`current`](Self::current) but synthesizes from `source`, e.g. the
    /// staged data of an in-flight store transaction.
    pub fn current_from(
        &self,
        id: SchemaId,
        source: &dyn DefinitionSource,
    ) -> Result<Arc<RuntimeType>> {
        self.current_with(id, source, false)
    }

    /// The cached type of `id` without synthesizing one.
    pub fn peek(&self, id: SchemaId) -> Result<Option<Arc<RuntimeType>>> {
        match self.existing_slot(id)? {
            Some(slot) => Ok(slot.current.lock()?.clone()),
            None => Ok(None),
        }
    }

    /// Synthesize `id` from committed definitions without touching its slot.
    ///
    /// The result carries detached bookkeeping and generation 0; it only
    /// describes the committed shape.
    pub fn committed_type(&self, id: SchemaId) -> Result<RuntimeType> {
        let snapshot = self.source.snapshot(id)?;
        self.synthesizer().synthesize(&snapshot, Bookkeeping::new())
    }

    /// Synthesize a replacement for `id` from `source` and install it once
    /// `apply` succeeds.
    ///
    /// `apply` receives the type being replaced (if cached) and the new one;
    /// it is where the schema operation runs. When it fails nothing is
    /// installed and the previous type stays current.
    pub fn regenerate<F>(
        &self,
        id: SchemaId,
        source: &dyn DefinitionSource,
        apply: F,
    ) -> Result<Arc<RuntimeType>>
    where
        F: FnOnce(Option<&Arc<RuntimeType>>, &RuntimeType) -> Result<()>,
    {
        let slot = self.slot(id)?;
        let installed = {
            let mut current = slot.current.lock()?;
            let snapshot = source.snapshot(id)?;
            let runtime = self
                .synthesizer()
                .synthesize(&snapshot, slot.bookkeeping.clone())?;
            apply(current.as_ref(), &runtime)?;
            self.install(id, &slot, &mut current, runtime)?
        };
        self.subscribe_dependencies(&installed)?;
        Ok(installed)
    }

    /// Flag the current type of `id` obsolete so the next access rebuilds it.
    pub fn mark_obsolete(&self, id: SchemaId) -> Result<()> {
        if let Some(slot) = self.existing_slot(id)? {
            let current = slot.current.lock()?;
            if let Some(runtime) = current.as_ref() {
                runtime.mark_obsolete();
                event!(Level::DEBUG, schema = %id, generation = runtime.generation(), "runtime type marked obsolete");
            }
            slot.bookkeeping.notify(id)?;
        }
        Ok(())
    }

    /// Drop everything cached for `id`, marking its type obsolete.
    pub fn evict(&self, id: SchemaId) -> Result<Option<Arc<RuntimeType>>> {
        let slot = self.slots.lock()?.remove(&id);
        let Some(slot) = slot else {
            return Ok(None);
        };
        let evicted = slot.current.lock()?.take();
        if let Some(runtime) = &evicted {
            runtime.mark_obsolete();
        }
        slot.bookkeeping.notify(id)?;
        event!(Level::DEBUG, schema = %id, "type cache slot evicted");
        Ok(evicted)
    }

    /// Release every slot; all cached types become obsolete.
    pub fn clear(&self) -> Result<()> {
        let slots: Vec<(SchemaId, Arc<TypeSlot>)> = self.slots.lock()?.drain().collect();
        for (id, slot) in slots {
            if let Some(runtime) = slot.current.lock()?.take() {
                runtime.mark_obsolete();
            }
            slot.bookkeeping.notify(id)?;
        }
        event!(Level::DEBUG, "type cache cleared");
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.slots.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn current_with(
        &self,
        id: SchemaId,
        source: &dyn DefinitionSource,
        force_rebuild: bool,
    ) -> Result<Arc<RuntimeType>> {
        let slot = self.slot(id)?;
        let installed = {
            let mut current = slot.current.lock()?;
            if let Some(runtime) = current.as_ref()
                && !force_rebuild
                && !runtime.is_obsolete()
            {
                return Ok(runtime.clone());
            }
            let snapshot = source.snapshot(id)?;
            let runtime = self
                .synthesizer()
                .synthesize(&snapshot, slot.bookkeeping.clone())?;
            self.install(id, &slot, &mut current, runtime)?
        };
        self.subscribe_dependencies(&installed)?;
        Ok(installed)
    }

    fn install(
        &self,
        id: SchemaId,
        slot: &TypeSlot,
        current: &mut MutexGuard<'_, Option<Arc<RuntimeType>>>,
        mut runtime: RuntimeType,
    ) -> Result<Arc<RuntimeType>> {
        runtime.generation = slot.bookkeeping.next_generation();
        let runtime = Arc::new(runtime);
        let previous = current.replace(runtime.clone());

        event!(
            Level::DEBUG,
            schema = %id,
            generation = runtime.generation(),
            "runtime type synthesized"
        );

        if let Some(previous) = previous {
            previous.mark_obsolete();
            slot.bookkeeping.notify(id)?;
        }
        Ok(runtime)
    }

    fn subscribe_dependencies(&self, runtime: &Arc<RuntimeType>) -> Result<()> {
        if runtime.dependencies().is_empty() {
            return Ok(());
        }
        let subscriber: Arc<dyn TypeSubscriber> = runtime.clone();
        for dependency in runtime.dependencies() {
            self.slot(*dependency)?
                .bookkeeping
                .subscribe(Arc::downgrade(&subscriber))?;
        }
        Ok(())
    }

    fn slot(&self, id: SchemaId) -> Result<Arc<TypeSlot>> {
        let mut slots = self.slots.lock()?;
        Ok(slots.entry(id).or_insert_with(TypeSlot::new).clone())
    }

    fn existing_slot(&self, id: SchemaId) -> Result<Option<Arc<TypeSlot>>> {
        Ok(self.slots.lock()?.get(&id).cloned())
    }
}
