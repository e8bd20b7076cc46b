//! Reusable representation instances, one pool per hit object kind.
//!
//! Pools use a soft cap: when every instance is in use a new one is built
//! even past `maximum_size`, so overlapping objects still render. Growth past
//! the initial size is logged, growth past the maximum is counted and warned
//! about.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::beatmap::{HitObject, HitObjectKind};
use crate::config::PoolConfig;
use crate::ids::HitObjectId;
use crate::lifetime::LifetimeEntry;
use crate::{Result, TimelineError};

/// Data bound into a representation when it is handed out.
#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    pub entity: HitObjectId,
    pub hit_object: &'a HitObject,
    pub entry: &'a LifetimeEntry,
    pub parent: Option<HitObjectId>,
}

/// A poolable visual representation.
pub trait Representation {
    /// Binds entry data. Must fully overwrite state left by a previous use.
    fn apply(&mut self, binding: &Binding<'_>);

    /// Returns the instance to a neutral, unbound state.
    fn free(&mut self);
}

/// Representation that can be placed along a scrolling axis.
pub trait ScrollingRepresentation: Representation {
    fn set_position(&mut self, position: f64);
    fn set_length(&mut self, length: f64);
}

/// Stable reference to one pooled instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepresentationHandle {
    pub kind: HitObjectKind,
    pub slot: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub constructed: usize,
    pub in_use: usize,
    pub idle: usize,
    pub peak_in_use: usize,
    /// Instances built while the pool was already at its maximum size.
    pub overflow: usize,
}

struct PoolSlot<R> {
    representation: R,
    in_use: bool,
}

pub struct Pool<R> {
    kind: HitObjectKind,
    slots: Vec<PoolSlot<R>>,
    idle: Vec<u32>,
    factory: Box<dyn Fn() -> R>,
    initial_size: usize,
    maximum_size: Option<usize>,
    stats: PoolStats,
}

impl<R> fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("kind", &self.kind)
            .field("initial_size", &self.initial_size)
            .field("maximum_size", &self.maximum_size)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<R: Representation> Pool<R> {
    /// Creates a pool and pre-warms `initial_size` instances.
    pub fn new(
        kind: HitObjectKind,
        factory: impl Fn() -> R + 'static,
        initial_size: usize,
        maximum_size: Option<usize>,
    ) -> Self {
        let mut pool = Self {
            kind,
            slots: Vec::with_capacity(initial_size),
            idle: Vec::with_capacity(initial_size),
            factory: Box::new(factory),
            initial_size,
            maximum_size,
            stats: PoolStats::default(),
        };

        for _ in 0..initial_size {
            let slot = pool.construct();
            pool.idle.push(slot);
        }
        // Hand out the lowest slots first.
        pool.idle.reverse();
        pool
    }

    pub fn kind(&self) -> HitObjectKind {
        self.kind
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            ..self.stats
        }
    }

    pub fn in_use(&self) -> usize {
        self.stats.in_use
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Hands out an idle instance (or a new one) after running `setup` on it.
    pub fn get(&mut self, setup: impl FnOnce(&mut R)) -> RepresentationHandle {
        let slot = match self.idle.pop() {
            Some(slot) => slot,
            None => self.grow(),
        };

        let entry = &mut self.slots[slot as usize];
        debug_assert!(!entry.in_use, "idle list handed out a slot in use");
        entry.in_use = true;
        setup(&mut entry.representation);

        self.stats.in_use += 1;
        self.stats.peak_in_use = self.stats.peak_in_use.max(self.stats.in_use);

        RepresentationHandle {
            kind: self.kind,
            slot,
        }
    }

    /// Frees the instance and marks it idle for reuse.
    pub fn release(&mut self, handle: RepresentationHandle) -> Result<()> {
        if handle.kind != self.kind {
            return Err(TimelineError::InvalidHandle(handle));
        }
        let slot = self
            .slots
            .get_mut(handle.slot as usize)
            .ok_or(TimelineError::InvalidHandle(handle))?;
        if !slot.in_use {
            debug_assert!(false, "double release of {handle:?}");
            return Err(TimelineError::DoubleRelease(handle));
        }

        slot.representation.free();
        slot.in_use = false;
        self.idle.push(handle.slot);
        self.stats.in_use -= 1;
        Ok(())
    }

    /// Instance behind a handle, only while it is in use.
    pub fn get_ref(&self, handle: RepresentationHandle) -> Option<&R> {
        self.slots
            .get(handle.slot as usize)
            .filter(|slot| slot.in_use && handle.kind == self.kind)
            .map(|slot| &slot.representation)
    }

    pub fn get_mut(&mut self, handle: RepresentationHandle) -> Option<&mut R> {
        let kind = self.kind;
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|slot| slot.in_use && handle.kind == kind)
            .map(|slot| &mut slot.representation)
    }

    fn grow(&mut self) -> u32 {
        let size = self.slots.len();
        match self.maximum_size {
            Some(maximum) if size >= maximum => {
                self.stats.overflow += 1;
                warn!(
                    kind = ?self.kind,
                    size,
                    maximum,
                    "pool exhausted, growing past its maximum size"
                );
            }
            _ if size >= self.initial_size => {
                debug!(kind = ?self.kind, size, "pool growing past its initial size");
            }
            _ => {}
        }
        self.construct()
    }

    fn construct(&mut self) -> u32 {
        let slot = self.slots.len() as u32;
        self.slots.push(PoolSlot {
            representation: (self.factory)(),
            in_use: false,
        });
        self.stats.constructed += 1;
        slot
    }
}

/// Pools keyed by the hit object kind they serve.
pub struct PoolRegistry<R> {
    pools: HashMap<HitObjectKind, Pool<R>>,
}

impl<R> fmt::Debug for PoolRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.pools.iter()).finish()
    }
}

impl<R: Representation> Default for PoolRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Representation> PoolRegistry<R> {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Builds one pool per configured kind from a shared factory.
    pub fn from_config<F>(configs: &[PoolConfig], factory: F) -> Self
    where
        F: Fn(HitObjectKind) -> R + Clone + 'static,
    {
        let mut registry = Self::new();
        for config in configs {
            let kind = config.kind;
            let factory = factory.clone();
            registry.register(Pool::new(
                kind,
                move || factory(kind),
                config.initial_size,
                config.maximum_size,
            ));
        }
        registry
    }

    pub fn register(&mut self, pool: Pool<R>) {
        let kind = pool.kind();
        if self.pools.insert(kind, pool).is_some() {
            warn!(?kind, "pool was already registered and has been replaced");
        }
    }

    pub fn pool(&self, kind: HitObjectKind) -> Option<&Pool<R>> {
        self.pools.get(&kind)
    }

    pub fn acquire(
        &mut self,
        kind: HitObjectKind,
        setup: impl FnOnce(&mut R),
    ) -> Result<RepresentationHandle> {
        let pool = self
            .pools
            .get_mut(&kind)
            .ok_or(TimelineError::MissingRepresentation { kind })?;
        Ok(pool.get(setup))
    }

    pub fn release(&mut self, handle: RepresentationHandle) -> Result<()> {
        self.pools
            .get_mut(&handle.kind)
            .ok_or(TimelineError::InvalidHandle(handle))?
            .release(handle)
    }

    pub fn get(&self, handle: RepresentationHandle) -> Option<&R> {
        self.pools.get(&handle.kind)?.get_ref(handle)
    }

    pub fn get_mut(&mut self, handle: RepresentationHandle) -> Option<&mut R> {
        self.pools.get_mut(&handle.kind)?.get_mut(handle)
    }

    pub fn in_use(&self) -> usize {
        self.pools.values().map(Pool::in_use).sum()
    }

    /// Statistics per kind, ordered by kind.
    pub fn stats(&self) -> Vec<(HitObjectKind, PoolStats)> {
        let mut stats: Vec<_> = self
            .pools
            .iter()
            .map(|(kind, pool)| (*kind, pool.stats()))
            .collect();
        stats.sort_by_key(|(kind, _)| *kind);
        stats
    }
}
