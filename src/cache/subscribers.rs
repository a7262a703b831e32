use crate::core::{Result, SchemaId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Something that must learn when a type it depends on is regenerated.
pub trait TypeSubscriber: Send + Sync {
    fn dependency_regenerated(&self, dependency: SchemaId);
}

/// Process-local state of one definition identity.
///
/// Outlives every individual runtime type of the definition: each synthesis
/// hands the same bookkeeping to the new type, so subscribers registered
/// against an earlier generation are still notified.
pub struct Bookkeeping {
    subscribers: Mutex<Vec<Weak<dyn TypeSubscriber>>>,
    generation: AtomicU64,
}

impl Bookkeeping {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// Track `subscriber` without keeping it alive.
    pub fn subscribe(&self, subscriber: Weak<dyn TypeSubscriber>) -> Result<()> {
        let mut subscribers = self.subscribers.lock()?;
        subscribers.retain(|existing| existing.strong_count() > 0);
        if !subscribers
            .iter()
            .any(|existing| Weak::ptr_eq(existing, &subscriber))
        {
            subscribers.push(subscriber);
        }
        Ok(())
    }

    /// Tell every live subscriber that `dependency` was regenerated.
    ///
    /// Returns how many subscribers were reached; dead entries are dropped.
    pub fn notify(&self, dependency: SchemaId) -> Result<usize> {
        let live: Vec<Arc<dyn TypeSubscriber>> = {
            let mut subscribers = self.subscribers.lock()?;
            subscribers.retain(|existing| existing.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in &live {
            subscriber.dependency_regenerated(dependency);
        }
        Ok(live.len())
    }

    pub fn subscriber_count(&self) -> Result<usize> {
        let subscribers = self.subscribers.lock()?;
        Ok(subscribers
            .iter()
            .filter(|existing| existing.strong_count() > 0)
            .count())
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}
